//! Social posts used as secondary grounding.
//!
//! Daily posts are identified by the `daily_` id prefix and are replaced
//! wholesale on each reseed; all other posts are long-lived.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::search::query_terms;
use super::types::XPost;
use crate::error::KoaError;

pub const DAILY_PREFIX: &str = "daily_";

const POST_COLUMNS: &str = "post_id, content, author, posted_at, likes, retweets, replies, url, \
                            hashtags, mentions, is_retweet, is_reply";

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<XPost> {
    let posted_at: String = row.get(3)?;
    let hashtags: String = row.get(8)?;
    let mentions: String = row.get(9)?;
    Ok(XPost {
        post_id: row.get(0)?,
        content: row.get(1)?,
        author: row.get(2)?,
        posted_at: parse_ts(&posted_at),
        likes: row.get(4)?,
        retweets: row.get(5)?,
        replies: row.get(6)?,
        url: row.get(7)?,
        hashtags: serde_json::from_str(&hashtags).unwrap_or_default(),
        mentions: serde_json::from_str(&mentions).unwrap_or_default(),
        is_retweet: row.get(10)?,
        is_reply: row.get(11)?,
    })
}

/// Insert posts, replacing any existing post with the same id.
pub fn upsert_posts(conn: &Connection, posts: &[XPost]) -> Result<usize, KoaError> {
    let now = format_ts(Utc::now());
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO x_posts \
         (post_id, content, author, posted_at, likes, retweets, replies, url, hashtags, mentions, is_retweet, is_reply, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for post in posts {
        stmt.execute(params![
            post.post_id,
            post.content,
            post.author,
            format_ts(post.posted_at),
            post.likes,
            post.retweets,
            post.replies,
            post.url,
            serde_json::to_string(&post.hashtags)?,
            serde_json::to_string(&post.mentions)?,
            post.is_retweet,
            post.is_reply,
            now,
        ])?;
    }
    Ok(posts.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPostCounts {
    pub removed: usize,
    pub inserted: usize,
}

/// Drop every `daily_` post and insert `posts` in one transaction.
pub fn replace_daily_posts(
    conn: &mut Connection,
    posts: &[XPost],
) -> Result<DailyPostCounts, KoaError> {
    let tx = conn.transaction()?;
    let removed = tx.execute(
        "DELETE FROM x_posts WHERE substr(post_id, 1, ?1) = ?2",
        params![DAILY_PREFIX.len() as i64, DAILY_PREFIX],
    )?;
    let inserted = upsert_posts(&tx, posts)?;
    tx.commit()?;

    tracing::info!(removed, inserted, "daily posts replaced");
    Ok(DailyPostCounts { removed, inserted })
}

/// Posts whose content, hashtags, or author mention any query word longer
/// than two characters, newest first.
pub fn search_posts(conn: &Connection, query: &str, limit: usize) -> Result<Vec<XPost>, KoaError> {
    let words = query_terms(&query.to_lowercase());
    if words.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM x_posts ORDER BY posted_at DESC, post_id DESC"
    ))?;
    let posts = stmt
        .query_map([], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;

    let matches = posts
        .into_iter()
        .filter(|post| {
            let content = post.content.to_lowercase();
            let author = post.author.to_lowercase();
            let tags: Vec<String> = post.hashtags.iter().map(|h| h.to_lowercase()).collect();
            words.iter().any(|w| {
                content.contains(w.as_str())
                    || author.contains(w.as_str())
                    || tags.iter().any(|t| t.contains(w.as_str()))
            })
        })
        .take(limit)
        .collect();
    Ok(matches)
}

/// Timestamp of the newest daily post, if any.
pub fn latest_daily_post_time(conn: &Connection) -> Result<Option<DateTime<Utc>>, KoaError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT posted_at FROM x_posts WHERE substr(post_id, 1, ?1) = ?2 \
             ORDER BY posted_at DESC LIMIT 1",
            params![DAILY_PREFIX.len() as i64, DAILY_PREFIX],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.as_deref().map(parse_ts))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCounts {
    pub total: u64,
    pub daily: u64,
}

pub fn count_posts(conn: &Connection) -> Result<PostCounts, KoaError> {
    let (total, daily): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(substr(post_id, 1, ?1) = ?2), 0) FROM x_posts",
        params![DAILY_PREFIX.len() as i64, DAILY_PREFIX],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(PostCounts {
        total: total as u64,
        daily: daily as u64,
    })
}
