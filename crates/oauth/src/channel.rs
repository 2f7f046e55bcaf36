//! How an authorization URL reaches the user and a code comes back.

use {
    async_trait::async_trait,
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout},
        sync::Mutex,
    },
    url::Url,
};

use crate::error::{Error, Result};

/// Interactive side of the authorization-code grant.
#[async_trait]
pub trait AuthorizationChannel: Send + Sync {
    /// Opaque value round-tripped through the provider as `state`.
    fn state(&self) -> String {
        String::new()
    }

    /// Show `url` to the user and return the authorization code they obtain.
    async fn authorize(&self, url: &Url) -> Result<String>;
}

// ── Prompt ───────────────────────────────────────────────────────────────────

/// Terminal channel: prints the URL and reads the code the user pastes back.
pub struct PromptChannel<R, W> {
    io: Mutex<(R, W)>,
}

impl PromptChannel<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> PromptChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

#[async_trait]
impl<R, W> AuthorizationChannel for PromptChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn authorize(&self, url: &Url) -> Result<String> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let prompt = format!(
            "Open your browser and go to the following URL:\n{url}\n\nEnter the authorization code: "
        );
        writer
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| Error::exchange(format!("failed to write prompt: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::exchange(format!("failed to write prompt: {e}")))?;

        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::exchange(format!("failed to read authorization code: {e}")))?;

        line.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::exchange("no authorization code entered"))
    }
}

// ── Redirect ─────────────────────────────────────────────────────────────────

/// Web channel: the code arrives later on the callback route, so the user is
/// sent to the provider and the current request ends with
/// [`Error::AuthorizationPending`].
#[derive(Debug, Clone, Default)]
pub struct RedirectChannel {
    state: String,
}

impl RedirectChannel {
    /// `state` is usually the path to return to after the callback.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }
}

#[async_trait]
impl AuthorizationChannel for RedirectChannel {
    fn state(&self) -> String {
        self.state.clone()
    }

    async fn authorize(&self, url: &Url) -> Result<String> {
        Err(Error::AuthorizationPending {
            url: url.to_string(),
        })
    }
}
