//! The demo actions selectable with `--action`.

use std::io::Write;

use {
    anyhow::{Result, bail},
    plusgate_oauth::{AuthorizationChannel, ClientFactory},
    tracing::{debug, warn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ActivitiesGet,
    PeopleSearch,
    PlusMe,
}

impl Action {
    /// Every action, in name order.
    pub const ALL: [Action; 3] = [Action::ActivitiesGet, Action::PeopleSearch, Action::PlusMe];

    pub fn name(self) -> &'static str {
        match self {
            Self::ActivitiesGet => "activities.get",
            Self::PeopleSearch => "people.search",
            Self::PlusMe => "plus.me",
        }
    }

    /// `all` expands to every action; anything else must name one.
    pub fn select(name: &str) -> Result<Vec<Action>> {
        if name == "all" {
            return Ok(Self::ALL.to_vec());
        }
        match Self::ALL.into_iter().find(|a| a.name() == name) {
            Some(action) => Ok(vec![action]),
            None => bail!(
                "Invalid action name: {name} (one of: all, {})",
                Self::ALL.map(Action::name).join(", ")
            ),
        }
    }
}

/// What the actions need besides the client factory.
pub struct ActionContext<'a> {
    pub factory: &'a ClientFactory,
    pub channel: &'a dyn AuthorizationChannel,
    pub identity: &'a str,
    pub activity_id: &'a str,
    pub query: &'a str,
}

impl ActionContext<'_> {
    /// Print the action's name underlined with dashes, then run it.
    pub async fn run(&self, action: Action, out: &mut impl Write) -> Result<()> {
        let name = action.name();
        writeln!(out, "{name}")?;
        writeln!(out, "{}", "-".repeat(name.len()))?;

        let resp = match action {
            Action::ActivitiesGet => {
                writeln!(out, "Getting activity with ID {:?}...", self.activity_id)?;
                let client = self.factory.no_auth()?;
                client
                    .get(&format!("activities/{}", self.activity_id), &[])
                    .await?
            },
            Action::PeopleSearch => {
                writeln!(out, "Searching for people matching {:?}...", self.query)?;
                let client = self.factory.no_auth()?;
                client.get("people", &[("query", self.query)]).await?
            },
            Action::PlusMe => {
                writeln!(out, "Getting the authenticated user's profile...")?;
                // The authorization prompt (if any) writes to the terminal itself.
                out.flush()?;
                let client = self.factory.oauth(self.identity, self.channel).await?;
                let resp = client.get("people/me", &[]).await?;
                if client.has_unsaved_tokens() {
                    warn!("refreshed tokens were not saved; the next run refreshes again");
                }
                resp
            },
        };

        let status = resp.status();
        let body = resp.text().await?;
        debug!(action = name, status = status.as_u16(), "action finished");
        if !status.is_success() {
            bail!("{name} failed with HTTP {}: {}", status.as_u16(), body.trim());
        }

        writeln!(out, "{}", pretty(&body))?;
        writeln!(out)?;
        Ok(())
    }
}

/// Pretty-print `body` when it is JSON, otherwise return it unchanged.
fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| body.to_string())
}
