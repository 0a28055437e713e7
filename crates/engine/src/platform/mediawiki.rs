// Action-API client.
//
// One shared HTTP client plus a cached CSRF token. API errors come back
// in-band as `{"error": {code, info}}`; `editconflict` maps to
// `PlatformError::EditConflict` and a stale `badtoken` is refreshed and
// retried once. Everything else surfaces as transport or protocol
// failures.

use anyhow::{anyhow, Context};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::error::PlatformError;
use crate::platform::{
    BlockSpec, EditOptions, ExistenceScope, PlatformClient, RenderUsage, RevisionToken,
};

const USER_AGENT: &str = concat!("caseclerk/", env!("CARGO_PKG_VERSION"));

pub struct MediaWikiClient {
    http: reqwest::Client,
    api: Url,
    csrf: Mutex<Option<String>>,
}

impl MediaWikiClient {
    /// Build a client against an `api.php` endpoint.
    pub fn new(api_url: &str) -> Result<Self, PlatformError> {
        let api = Url::parse(api_url)
            .map_err(|e| PlatformError::Protocol(format!("invalid api url {api_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self { http, api, csrf: Mutex::new(None) })
    }

    // ── Request plumbing ───────────────────────────────────────────

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let mut query: Vec<(&str, &str)> = vec![("format", "json"), ("formatversion", "2")];
        query.extend_from_slice(params);

        let response = self
            .http
            .get(self.api.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let value: Value =
            response.json().await.map_err(|e| PlatformError::Transport(e.to_string()))?;
        if let Some((code, info)) = api_error(&value) {
            return Err(PlatformError::Protocol(format!("{code}: {info}")));
        }
        Ok(value)
    }

    /// POST with a CSRF token, retrying once on a stale token.
    async fn post_with_token(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> Result<Value, PlatformError> {
        for attempt in 0..2 {
            let token = self.csrf_token().await?;
            let mut form = params.clone();
            form.push(("format", "json".into()));
            form.push(("formatversion", "2".into()));
            form.push(("token", token));

            let response = self
                .http
                .post(self.api.clone())
                .form(&form)
                .send()
                .await
                .map_err(|e| PlatformError::Transport(e.to_string()))?;
            let value: Value =
                response.json().await.map_err(|e| PlatformError::Transport(e.to_string()))?;

            match api_error(&value) {
                Some((code, _)) if code == "badtoken" && attempt == 0 => {
                    debug!("stale csrf token, refreshing");
                    self.csrf.lock().await.take();
                }
                Some((code, info)) => {
                    return Err(PlatformError::Protocol(format!("{code}: {info}")));
                }
                None => return Ok(value),
            }
        }
        Err(PlatformError::Protocol("csrf token refresh failed".into()))
    }

    async fn csrf_token(&self) -> Result<String, PlatformError> {
        let mut cached = self.csrf.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let value = self.get(&[("action", "query"), ("meta", "tokens"), ("type", "csrf")]).await?;
        let token = value["query"]["tokens"]["csrftoken"]
            .as_str()
            .ok_or_else(|| PlatformError::Protocol("no csrf token in response".into()))?
            .to_string();
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Extract an in-band API error, if present.
fn api_error(value: &Value) -> Option<(String, String)> {
    let error = value.get("error")?;
    let code = error["code"].as_str().unwrap_or("unknown").to_string();
    let info = error["info"].as_str().unwrap_or("").to_string();
    Some((code, info))
}

/// First page object of a `query` response.
fn first_page(value: &Value) -> anyhow::Result<&Value> {
    value["query"]["pages"]
        .as_array()
        .and_then(|pages| pages.first())
        .ok_or_else(|| anyhow!("no pages in query response"))
}

fn protocol(err: anyhow::Error) -> PlatformError {
    PlatformError::Protocol(format!("{err:#}"))
}

impl PlatformClient for MediaWikiClient {
    async fn fetch_page_text(
        &self,
        title: &str,
        section: Option<usize>,
    ) -> Result<String, PlatformError> {
        match section {
            None => {
                let value = self
                    .get(&[
                        ("action", "query"),
                        ("prop", "revisions"),
                        ("rvprop", "content"),
                        ("rvslots", "main"),
                        ("titles", title),
                    ])
                    .await?;
                let page = first_page(&value).map_err(protocol)?;
                if page.get("missing").is_some_and(|m| m != &Value::Bool(false)) {
                    return Ok(String::new());
                }
                page["revisions"][0]["slots"]["main"]["content"]
                    .as_str()
                    .map(ToOwned::to_owned)
                    .context("page content missing from revision")
                    .map_err(protocol)
            }
            Some(index) => {
                let section = index.to_string();
                let result = self
                    .get(&[
                        ("action", "parse"),
                        ("page", title),
                        ("prop", "wikitext"),
                        ("section", &section),
                    ])
                    .await;
                match result {
                    Ok(value) => value["parse"]["wikitext"]
                        .as_str()
                        .map(ToOwned::to_owned)
                        .context("no wikitext in parse response")
                        .map_err(protocol),
                    // Missing page or section reads as empty, like whole-page fetches.
                    Err(PlatformError::Protocol(message))
                        if message.starts_with("missingtitle")
                            || message.starts_with("nosuchsection") =>
                    {
                        Ok(String::new())
                    }
                    Err(other) => Err(other),
                }
            }
        }
    }

    async fn edit_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
        options: &EditOptions,
    ) -> Result<(), PlatformError> {
        let mut params: Vec<(&'static str, String)> = vec![
            ("action", "edit".into()),
            ("title", title.into()),
            ("text", text.into()),
            ("summary", summary.into()),
            ("watchlist", options.watch.as_str().into()),
        ];
        if let Some(expiry) = &options.watch_expiry {
            params.push(("watchlistexpiry", expiry.clone()));
        }
        if let Some(base) = options.base_revision {
            params.push(("baserevid", base.0.to_string()));
        }
        if let Some(section) = options.section {
            params.push(("section", section.to_string()));
        }
        if options.create_only {
            params.push(("createonly", "1".into()));
        }

        match self.post_with_token(params).await {
            Ok(_) => Ok(()),
            Err(PlatformError::Protocol(message)) if message.starts_with("editconflict") => {
                Err(PlatformError::EditConflict { title: title.to_string() })
            }
            Err(other) => Err(other),
        }
    }

    async fn move_page(
        &self,
        from: &str,
        to: &str,
        summary: &str,
        leave_redirect: bool,
    ) -> Result<(), PlatformError> {
        let mut params: Vec<(&'static str, String)> = vec![
            ("action", "move".into()),
            ("from", from.into()),
            ("to", to.into()),
            ("reason", summary.into()),
            ("movetalk", "1".into()),
        ];
        if !leave_redirect {
            params.push(("noredirect", "1".into()));
        }
        self.post_with_token(params).await.map(|_| ())
    }

    async fn block_account(&self, spec: &BlockSpec) -> Result<(), PlatformError> {
        let mut params: Vec<(&'static str, String)> = vec![
            ("action", "block".into()),
            ("user", spec.target.clone()),
            ("expiry", spec.expiry.clone()),
            ("reason", spec.summary.clone()),
        ];
        if spec.no_account_creation {
            params.push(("nocreate", "1".into()));
        }
        if spec.autoblock {
            params.push(("autoblock", "1".into()));
        }
        if !spec.revoke_talk {
            params.push(("allowusertalk", "1".into()));
        }
        if spec.revoke_email {
            params.push(("noemail", "1".into()));
        }
        if spec.reblock {
            params.push(("reblock", "1".into()));
        }
        self.post_with_token(params).await.map(|_| ())
    }

    async fn protect_page(&self, title: &str, summary: &str) -> Result<(), PlatformError> {
        let params: Vec<(&'static str, String)> = vec![
            ("action", "protect".into()),
            ("title", title.into()),
            ("protections", "edit=sysop|move=sysop".into()),
            ("reason", summary.into()),
        ];
        self.post_with_token(params).await.map(|_| ())
    }

    async fn current_revision(&self, title: &str) -> Result<RevisionToken, PlatformError> {
        let value = self
            .get(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("rvprop", "ids"),
                ("titles", title),
            ])
            .await?;
        let page = first_page(&value).map_err(protocol)?;
        if page.get("missing").is_some_and(|m| m != &Value::Bool(false)) {
            return Ok(RevisionToken::NONE);
        }
        page["revisions"][0]["revid"]
            .as_u64()
            .map(RevisionToken)
            .context("no revision id on page")
            .map_err(protocol)
    }

    async fn rendered_usage(
        &self,
        title: &str,
        section: Option<usize>,
    ) -> Result<RenderUsage, PlatformError> {
        let mut params: Vec<(&str, String)> = vec![
            ("action", "parse".to_string()),
            ("page", title.to_string()),
            ("prop", "limitreportdata".to_string()),
        ];
        if let Some(index) = section {
            params.push(("section", index.to_string()));
        }
        let borrowed: Vec<(&str, &str)> =
            params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        match self.get(&borrowed).await {
            Ok(value) => parse_limit_report(&value).map_err(protocol),
            // A page that does not exist yet renders at zero size.
            Err(PlatformError::Protocol(message)) if message.starts_with("missingtitle") => {
                Ok(RenderUsage { used: 0, limit: 0 })
            }
            Err(other) => Err(other),
        }
    }

    async fn account_exists(
        &self,
        name: &str,
        scope: ExistenceScope,
    ) -> Result<bool, PlatformError> {
        let value = match scope {
            ExistenceScope::Local => {
                self.get(&[
                    ("action", "query"),
                    ("list", "allusers"),
                    ("aufrom", name),
                    ("aulimit", "1"),
                ])
                .await?
            }
            ExistenceScope::Global => {
                self.get(&[
                    ("action", "query"),
                    ("list", "globalallusers"),
                    ("agufrom", name),
                    ("agulimit", "1"),
                ])
                .await?
            }
        };
        let list = match scope {
            ExistenceScope::Local => &value["query"]["allusers"],
            ExistenceScope::Global => &value["query"]["globalallusers"],
        };
        Ok(list
            .as_array()
            .and_then(|users| users.first())
            .and_then(|user| user["name"].as_str())
            .is_some_and(|found| found == name))
    }

    async fn is_locked(&self, name: &str) -> Result<bool, PlatformError> {
        let value = self
            .get(&[
                ("action", "query"),
                ("list", "globalallusers"),
                ("agufrom", name),
                ("agulimit", "1"),
                ("aguprop", "lockinfo"),
            ])
            .await?;
        Ok(value["query"]["globalallusers"]
            .as_array()
            .and_then(|users| users.first())
            .filter(|user| user["name"].as_str() == Some(name))
            .is_some_and(|user| user.get("locked").is_some()))
    }

    async fn block_reason(&self, name: &str) -> Result<Option<String>, PlatformError> {
        let value = self
            .get(&[
                ("action", "query"),
                ("list", "blocks"),
                ("bkusers", name),
                ("bkprop", "reason"),
            ])
            .await?;
        Ok(value["query"]["blocks"]
            .as_array()
            .and_then(|blocks| blocks.first())
            .and_then(|block| block["reason"].as_str())
            .map(ToOwned::to_owned))
    }

    async fn backlinks(&self, title: &str) -> Result<Vec<String>, PlatformError> {
        let mut titles = Vec::new();
        let mut continue_from: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("action", "query"),
                ("list", "backlinks"),
                ("bltitle", title),
                ("bllimit", "max"),
            ];
            if let Some(from) = &continue_from {
                params.push(("blcontinue", from));
            }
            let value = self.get(&params).await?;

            if let Some(links) = value["query"]["backlinks"].as_array() {
                titles.extend(
                    links.iter().filter_map(|l| l["title"].as_str().map(ToOwned::to_owned)),
                );
            }
            match value["continue"]["blcontinue"].as_str() {
                Some(next) => continue_from = Some(next.to_string()),
                None => break,
            }
        }
        Ok(titles)
    }

    async fn purge(&self, title: &str) -> Result<(), PlatformError> {
        let form: Vec<(&str, String)> = vec![
            ("action", "purge".to_string()),
            ("titles", title.to_string()),
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
        ];
        let response = self
            .http
            .post(self.api.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let value: Value =
            response.json().await.map_err(|e| PlatformError::Transport(e.to_string()))?;
        if let Some((code, info)) = api_error(&value) {
            return Err(PlatformError::Protocol(format!("{code}: {info}")));
        }
        Ok(())
    }
}

/// Pull post-expand include size and its limit out of a parse report.
fn parse_limit_report(value: &Value) -> anyhow::Result<RenderUsage> {
    let entries = value["parse"]["limitreportdata"]
        .as_array()
        .ok_or_else(|| anyhow!("no limit report in parse response"))?;
    let entry = entries
        .iter()
        .find(|entry| {
            entry["name"]
                .as_str()
                .is_some_and(|name| name.ends_with("postexpandincludesize"))
        })
        .ok_or_else(|| anyhow!("no post-expand include size in limit report"))?;

    // formatversion=2 reports numbered fields on the entry itself.
    let used = entry["0"]
        .as_u64()
        .or_else(|| entry["value"][0].as_u64())
        .ok_or_else(|| anyhow!("unreadable include size"))?;
    let limit = entry["1"]
        .as_u64()
        .or_else(|| entry["value"][1].as_u64())
        .ok_or_else(|| anyhow!("unreadable include size limit"))?;
    Ok(RenderUsage { used, limit })
}
