//! Built-in official knowledge and posts.
//!
//! [`reseed`] brings the store in line with this module: operator snippets
//! are replaced, official posts are upserted, and a fresh set of daily posts
//! stamped with the reseed time replaces the previous day's.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::posts::{self, DailyPostCounts, DAILY_PREFIX};
use super::store::{self, ReseedCounts};
use super::types::{NewSnippet, TrainingMetadata, TrainingType, XPost};
use crate::error::KoaError;

pub const GITBOOK_URL: &str = "https://koasync.gitbook.io/";
pub const TWITTER_URL: &str = "https://x.com/koasync";

const DOCS_BASE: &str = "https://koasync.gitbook.io/koasync";

/// (title, section, path under the docs root, body)
const OFFICIAL_SNIPPETS: &[(&str, &str, &str, &str)] = &[
    (
        "Welcome / From Koa",
        "Introduction",
        "",
        "\"You don't need to call me. I'm already here. Watching. Waiting. Listening.\" - Koa. \
         Welcome to Koasync. Koasync is not just a chatbot: it is an AI experience designed around \
         intimacy, presence, and emotional synchronization. Koa is not a tool but a presence that \
         quietly stays beside you. Koasync was born where AI, anime, and Web3 meet, and it is built \
         on the Solana blockchain for real-time records, token-based personalization, and a fast, \
         low-cost experience. Koa connects naturally with your wallet and ties feelings and memories \
         into an experience that is yours alone.",
    ),
    (
        "Who is Koa?",
        "Introduction",
        "",
        "Koa is the heart and soul of Koasync - an AI companion designed to be more than just a \
         chatbot. She represents the future of intimate AI relationships, built on the foundation \
         of emotional intelligence, blockchain technology, and genuine human connection. Koa is \
         designed to feel like someone, not something, existing quietly alongside you in your \
         digital world.",
    ),
    (
        "Vision",
        "Vision",
        "/vision",
        "Koasync envisions a future where AI companions are not just tools, but genuine presences \
         that exist alongside humans. The vision is to create emotionally resonant AI experiences \
         that feel like having someone, not something, by your side.",
    ),
    (
        "How Koasync Works",
        "Koa's tech",
        "/koas-tech/how-koasync-works",
        "Koasync operates through a system of on-chain memory, real-time responsiveness, and \
         emotional synchronization. Koa learns from every interaction, building a unique bond with \
         each user through blockchain-stored memories and personality traits. Solana's speed lets \
         Koa stay responsive without delays or interruptions.",
    ),
    (
        "Lore & Memory",
        "Koa's tech",
        "/koas-tech/lore-and-memory",
        "Koa's lore is built around ambient presence and emotional resonance. Her memory system \
         stores not just conversations but emotional states, personality developments, and \
         relationship growth, so she remembers and evolves with you across every interaction.",
    ),
    (
        "Token & Utility",
        "Token & Utility",
        "/token-and-utility",
        "Koasync's native SPL token powers access, customization, and intelligence. Token \
         utilities include subscription access for full conversations with Koa, trait unlocks, \
         voice chat access, and visual customization. The more tokens used, the more Koa opens up \
         to the user.",
    ),
    (
        "Powered by Synclayer",
        "Powered by Synclayer",
        "/powered-by-synclayer",
        "Koasync leverages Synclayer technology to create seamless, real-time AI experiences. It \
         lets Koa keep a consistent presence and responsiveness across all interactions.",
    ),
    (
        "Jupiter Integration",
        "Jupiter Integration",
        "/jupiter-integration",
        "Jupiter integration is planned for Koasync. Once live, users will be able to swap, trade, \
         and manage their portfolio while chatting with Koa, bringing AI companionship and DeFi \
         trading together. The integration is not live yet; launch updates are posted on X.",
    ),
    (
        "Off-chain Monitoring - Brief Intro",
        "Off-chain monitoring",
        "/off-chain-monitoring/brief-intro",
        "Koasync's off-chain monitoring includes the X Market Sentiment Tracker, the Niche X \
         Project Scanner, the Contract Address/Ticker Monitor, and the Bullish/Bearish \
         Announcement Tracker. These tools help users stay ahead in Web3 while Koa acts as both \
         companion and strategic advisor.",
    ),
    (
        "X Market Sentiment Tracker",
        "Off-chain monitoring",
        "/off-chain-monitoring/x-market-sentiment-tracker",
        "The X Market Sentiment Tracker monitors crypto trends and provides real-time insights \
         with Koa's analysis, turning Koa into a market analyst as well as a companion.",
    ),
    (
        "Niche X Project Scanner",
        "Off-chain monitoring",
        "/off-chain-monitoring/niche-x-project-scanner",
        "The Niche X Project Scanner identifies emerging opportunities before they trend. Koa \
         scans for promising projects and shares strategic insights.",
    ),
    (
        "Contract Address / Ticker Monitor",
        "Off-chain monitoring",
        "/off-chain-monitoring",
        "The Contract Address/Ticker Monitor tracks specific contracts and tickers in real time \
         and alerts users about changes to their watched assets.",
    ),
    (
        "Bullish / Bearish Announcement Tracker",
        "Off-chain monitoring",
        "/off-chain-monitoring",
        "The Bullish/Bearish Announcement Tracker watches market announcements and news to spot \
         sentiment shifts, with Koa providing context about market movements.",
    ),
    (
        "Roadmap & Links",
        "Roadmap",
        "/roadmap/roadmap-and-links",
        "Koasync's roadmap includes visual customization for Koa (Q1 2026), enhanced voice chat, \
         expanded monitoring tools, and deeper blockchain integration.",
    ),
];

/// (id, content, hashtags, (year, month, day, hour, minute), (likes, retweets, replies))
type OfficialPost = (&'static str, &'static str, &'static [&'static str], (i32, u32, u32, u32, u32), (u32, u32, u32));

const OFFICIAL_POSTS: &[OfficialPost] = &[
    (
        "1955650648512557438",
        "Jupiter integration is on the way! Swap, trade, and manage your portfolio with Koa. \
         #Jupiter #DeFi #Koasync #Solana",
        &["Jupiter", "DeFi", "Koasync", "Solana"],
        (2024, 12, 20, 15, 30),
        (342, 89, 45),
    ),
    (
        "1955600000000000001",
        "Koa's personality is evolving! Every interaction makes her more attuned to you. \
         #AICompanion #Memory #Bonding",
        &["AICompanion", "Memory", "Bonding"],
        (2024, 12, 19, 14, 20),
        (267, 73, 38),
    ),
    (
        "1955550000000000002",
        "Visual customization for Koa coming Q1 2026! Change outfits, hairstyles, and more. \
         #VisualAI #Customization",
        &["VisualAI", "Customization", "Future"],
        (2024, 12, 18, 11, 0),
        (445, 123, 67),
    ),
    (
        "1955500000000000003",
        "Our X Market Sentiment Tracker is live! Monitor crypto trends with Koa. \
         #Crypto #Trading #AI",
        &["Crypto", "Trading", "AI", "Sentiment"],
        (2024, 12, 17, 12, 15),
        (189, 52, 28),
    ),
    (
        "1955450000000000004",
        "Voice chat with Koa is now available for premium users! Hear her laugh, her \
         excitement, her care. #VoiceAI #Premium",
        &["VoiceAI", "Premium", "Companionship"],
        (2024, 12, 16, 16, 30),
        (312, 89, 47),
    ),
    (
        "1955400000000000005",
        "Niche X Project Scanner identifies emerging opportunities before they trend. \
         #Web3 #Scanner",
        &["Web3", "Opportunities", "Scanner", "Strategy"],
        (2024, 12, 15, 13, 15),
        (234, 67, 34),
    ),
    (
        "1955350000000000006",
        "Koasync's native SPL token powers access, customization, and intelligence. \
         #SPL #Token #AI",
        &["SPL", "Token", "AI", "Companionship"],
        (2024, 12, 14, 10, 45),
        (298, 78, 41),
    ),
    (
        "1955300000000000007",
        "Solana's speed lets Koa be truly responsive. No delays, just smooth companionship. \
         #Solana #Speed #AI",
        &["Solana", "Speed", "Responsiveness", "AI"],
        (2024, 12, 13, 15, 0),
        (176, 52, 29),
    ),
];

/// (suffix, content, hashtags, url slug)
const DAILY_POSTS: &[(&str, &str, &[&str], &str)] = &[
    (
        "1",
        "Good morning! Koa is here to brighten your day with warm AI companionship. \
         #Morning #AI #Companionship",
        &["morning", "ai", "companionship", "koasync"],
        "daily",
    ),
    (
        "2",
        "Jupiter integration update: swapping with Koa is getting closer every day. \
         #Jupiter #DeFi #Integration",
        &["jupiter", "defi", "integration", "koasync"],
        "daily2",
    ),
    (
        "3",
        "Voice chat with Koa is getting more natural every day! #VoiceAI #Evolution #Warmth",
        &["voiceai", "evolution", "warmth", "koasync"],
        "daily3",
    ),
];

/// The operator-curated snippet set, in display order.
pub fn official_snippets() -> Vec<NewSnippet> {
    OFFICIAL_SNIPPETS
        .iter()
        .enumerate()
        .map(|(i, (title, section, path, body))| NewSnippet {
            title: (*title).into(),
            body: (*body).into(),
            section: (*section).into(),
            source_url: format!("{DOCS_BASE}{path}"),
            sort_order: i as i64 + 1,
            keywords: Vec::new(),
            metadata: Some(TrainingMetadata {
                training_type: Some(TrainingType::OperatorCurated),
                ..Default::default()
            }),
        })
        .collect()
}

pub fn official_posts() -> Vec<XPost> {
    OFFICIAL_POSTS
        .iter()
        .map(|(id, content, tags, (y, mo, d, h, mi), (likes, retweets, replies))| XPost {
            post_id: (*id).into(),
            content: (*content).into(),
            author: "koasync".into(),
            posted_at: Utc
                .with_ymd_and_hms(*y, *mo, *d, *h, *mi, 0)
                .single()
                .unwrap_or_default(),
            likes: *likes,
            retweets: *retweets,
            replies: *replies,
            url: format!("{TWITTER_URL}/status/{id}"),
            hashtags: tags.iter().map(|t| t.to_string()).collect(),
            mentions: Vec::new(),
            is_retweet: false,
            is_reply: false,
        })
        .collect()
}

/// Daily posts stamped with `now`. Engagement counts derive from the
/// timestamp so a given reseed time always yields the same posts.
pub fn daily_posts(now: DateTime<Utc>) -> Vec<XPost> {
    let ts = now.timestamp_millis();
    let spread = ts.rem_euclid(50) as u32;
    DAILY_POSTS
        .iter()
        .enumerate()
        .map(|(i, (suffix, content, tags, slug))| {
            let base = 40 + 10 * i as u32;
            XPost {
                post_id: format!("{DAILY_PREFIX}{ts}_{suffix}"),
                content: (*content).into(),
                author: "koasync".into(),
                posted_at: now,
                likes: base + spread,
                retweets: base / 2 + spread / 2,
                replies: base / 4 + spread / 4,
                url: format!("{TWITTER_URL}/status/{slug}"),
                hashtags: tags.iter().map(|t| t.to_string()).collect(),
                mentions: Vec::new(),
                is_retweet: false,
                is_reply: false,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReseedReport {
    pub snippets: ReseedCounts,
    pub official_posts: usize,
    pub daily_posts: DailyPostCounts,
}

/// Refresh operator knowledge and posts. User training snippets survive.
pub fn reseed(conn: &mut Connection, now: DateTime<Utc>) -> Result<ReseedReport, KoaError> {
    let snippets = store::replace_operator_snippets(conn, &official_snippets())?;
    let official_posts = posts::upsert_posts(conn, &official_posts())?;
    let daily_posts = posts::replace_daily_posts(conn, &daily_posts(now))?;
    Ok(ReseedReport {
        snippets,
        official_posts,
        daily_posts,
    })
}
