//! Timeline fetch and renote filter. Callers here hold a valid access
//! token; no auth logic lives in this module.
use crate::session::AccessToken;
use anyhow::{anyhow, Result};
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
pub struct NoteFile {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenoteUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Renote {
    pub user: RenoteUser,
    pub files: Vec<NoteFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Note {
    pub renote_id: Option<String>,
    pub renote: Option<Renote>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relation {
    #[serde(rename = "isFollowing", default)]
    pub is_following: bool,
}

/// What the index page renders per interesting renote.
#[derive(Debug, Clone)]
pub struct NoteDisplay {
    pub user_url: String,
    pub files: Vec<NoteFile>,
}

async fn post_api<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
    body: serde_json::Value,
) -> Result<T> {
    let resp = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .json(&body)
        .send()
        .await?;
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(anyhow!("api call to {} failed: {} => {}", url, status, text));
    }
    serde_json::from_str(&text).map_err(|e| anyhow!("decode api response: {} ({})", e, text))
}

/// The relation API answers with an array of relation objects, one per
/// queried user id.
pub async fn check_follow_status(
    client: &Client,
    instance_base: &str,
    token: &AccessToken,
    user_id: &str,
) -> Result<bool> {
    let url = format!("{}/api/users/relation", instance_base);
    let relations: Vec<Relation> = post_api(
        client,
        &url,
        json!({ "i": token.secret(), "userId": user_id }),
    )
    .await?;
    relations
        .first()
        .map(|r| r.is_following)
        .ok_or_else(|| anyhow!("no relation data found for user {}", user_id))
}

/// Fetch the home timeline and keep renotes whose author the viewer does
/// not already follow, one entry per author.
pub async fn fetch_notes(
    client: &Client,
    instance_base: &str,
    token: &AccessToken,
    limit: u32,
) -> Result<Vec<NoteDisplay>> {
    let url = format!("{}/api/notes/timeline", instance_base);
    let notes: Vec<Note> = post_api(
        client,
        &url,
        json!({ "i": token.secret(), "limit": limit }),
    )
    .await?;

    let mut display = Vec::new();
    let mut processed_usernames: HashSet<String> = HashSet::new();
    for note in notes.iter().take(limit as usize) {
        // Plain notes are authored by people the viewer follows; only
        // renotes can surface someone new.
        if note.renote_id.as_deref().unwrap_or("").is_empty() {
            continue;
        }
        let Some(renote) = &note.renote else { continue };
        if processed_usernames.contains(&renote.user.username) {
            continue;
        }

        debug!("checking follow state for renote author {}", renote.user.id);
        let following =
            check_follow_status(client, instance_base, token, &renote.user.id).await?;
        if !following {
            display.push(NoteDisplay {
                user_url: format!("{}/@{}", instance_base, renote.user.username),
                files: renote.files.clone(),
            });
            processed_usernames.insert(renote.user.username.clone());
        }
    }

    Ok(display)
}
