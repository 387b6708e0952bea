//! Canonical identifier tokens for records and scraped entries.
//!
//! Both sides of a match go through the same functions so that two
//! representations of one account (mobile vs desktop URL, handle vs profile
//! link, spaced vs unspaced nickname) land on a shared token.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use blockrank_common::{Record, ScrapedEntry};

static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid regex"));

/// Hosts whose first path segment is the account handle.
const ACCOUNT_HOSTS: &[&str] = &["blog.naver.com", "in.naver.com"];

/// Host prefixes that don't change which page is served.
const HOST_ALIASES: &[&str] = &["www.", "m."];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Handle,
    Name,
    Title,
    Url,
    LinkHandle,
    LinkedAccount,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Handle => "handle",
            IdentifierKind::Name => "name",
            IdentifierKind::Title => "title",
            IdentifierKind::Url => "url",
            IdentifierKind::LinkHandle => "link_handle",
            IdentifierKind::LinkedAccount => "linked_account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub token: String,
}

/// Unordered, deduplicated lowercase tokens for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet(BTreeSet<String>);

impl IdentifierSet {
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    /// True if any token has `needle` as a substring.
    pub fn any_contains(&self, needle: &str) -> bool {
        self.0.iter().any(|token| token.contains(needle))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shares_token_with(&self, other: &IdentifierSet) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }
}

impl FromIterator<String> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// --- Token normalizers ---

/// Lowercased handle, if it looks like one.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    HANDLE_RE.is_match(&lower).then_some(lower)
}

/// Display names and titles: all whitespace removed, lowercased.
pub fn normalize_text(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    (!compact.is_empty()).then_some(compact)
}

fn parse_link(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }
    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("https://{trimmed}")).ok()?
    };
    match parsed.host_str() {
        Some(host) if host.contains('.') => Some(parsed),
        _ => None,
    }
}

fn canonical_host(url: &Url) -> Option<String> {
    let mut host = url.host_str()?.to_lowercase();
    for alias in HOST_ALIASES {
        if let Some(stripped) = host.strip_prefix(alias) {
            host = stripped.to_string();
        }
    }
    Some(host)
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// `host+path` with scheme, query, fragment and trailing slash removed.
///
/// `PostView` links on the blog host carry the handle and post number in the
/// query; they are rewritten to the equivalent `blog.naver.com/<id>/<no>`
/// path so both URL shapes share a key.
pub fn url_key(raw: &str) -> Option<String> {
    let url = parse_link(raw)?;
    let host = canonical_host(&url)?;

    if host == "blog.naver.com" {
        if let Some(blog_id) = query_value(&url, "blogId") {
            let mut key = format!("{host}/{}", blog_id.to_lowercase());
            if let Some(log_no) = query_value(&url, "logNo") {
                key.push('/');
                key.push_str(&log_no);
            }
            return Some(key);
        }
    }

    let path = url.path().trim_end_matches('/').to_lowercase();
    Some(format!("{host}{path}"))
}

/// The account handle implied by a link on a known account-hosting domain.
pub fn handle_from_link(raw: &str) -> Option<String> {
    let url = parse_link(raw)?;
    let host = canonical_host(&url)?;
    if !ACCOUNT_HOSTS.contains(&host.as_str()) {
        return None;
    }

    if let Some(blog_id) = query_value(&url, "blogId") {
        return normalize_handle(&blog_id);
    }

    let first = url.path_segments()?.find(|s| !s.is_empty())?;
    normalize_handle(first)
}

// --- Entity identifiers ---

fn linked_account_tokens(raw: &str) -> Vec<String> {
    if raw.contains('/') || raw.contains('.') {
        [handle_from_link(raw), url_key(raw)]
            .into_iter()
            .flatten()
            .collect()
    } else {
        normalize_handle(raw)
            .or_else(|| normalize_text(raw))
            .into_iter()
            .collect()
    }
}

/// Record identifiers in match priority order, first occurrence of each
/// token kept: handle, author name, title, URL key, handle-from-link, then
/// linked accounts.
pub fn record_identifiers(record: &Record) -> Vec<Identifier> {
    let mut ordered: Vec<Identifier> = Vec::new();
    let mut push = |kind: IdentifierKind, token: Option<String>| {
        if let Some(token) = token {
            if !ordered.iter().any(|i| i.token == token) {
                ordered.push(Identifier { kind, token });
            }
        }
    };

    push(IdentifierKind::Handle, normalize_handle(&record.id));
    push(
        IdentifierKind::Name,
        record.author.as_deref().and_then(normalize_text),
    );
    push(
        IdentifierKind::Title,
        record.title.as_deref().and_then(normalize_text),
    );
    push(IdentifierKind::Url, record.link.as_deref().and_then(url_key));
    push(
        IdentifierKind::LinkHandle,
        record.link.as_deref().and_then(handle_from_link),
    );
    for account in &record.linked_accounts {
        for token in linked_account_tokens(account) {
            push(IdentifierKind::LinkedAccount, Some(token));
        }
    }

    ordered
}

pub fn record_identifier_set(record: &Record) -> IdentifierSet {
    record_identifiers(record)
        .into_iter()
        .map(|i| i.token)
        .collect()
}

/// All tokens an entry can be recognized by.
pub fn entry_identifiers(entry: &ScrapedEntry) -> IdentifierSet {
    let link = Some(entry.link.as_str());
    let profile = entry.profile_link.as_deref();

    [
        entry.external_id.as_deref().and_then(normalize_handle),
        link.and_then(handle_from_link),
        profile.and_then(handle_from_link),
        link.and_then(url_key),
        profile.and_then(url_key),
        entry.nickname.as_deref().and_then(normalize_text),
        normalize_text(&entry.title),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            keyword: "사회복지사2급".to_string(),
            link: None,
            title: None,
            author: None,
            linked_accounts: Vec::new(),
        }
    }

    fn entry(link: &str) -> ScrapedEntry {
        ScrapedEntry {
            keyword: "사회복지사2급".to_string(),
            external_id: None,
            title: "사회복지사 2급 취득 후기".to_string(),
            link: link.to_string(),
            profile_link: None,
            rank: 1,
            nickname: None,
            snippet: None,
            block_title: "인기글".to_string(),
        }
    }

    #[test]
    fn handles_are_lowercased_and_validated() {
        assert_eq!(normalize_handle(" WindUSJ "), Some("windusj".to_string()));
        assert_eq!(normalize_handle("my_blog-01"), Some("my_blog-01".to_string()));
        assert_eq!(normalize_handle("홍길동"), None);
        assert_eq!(normalize_handle("a.b"), None);
        assert_eq!(normalize_handle(""), None);
    }

    #[test]
    fn text_loses_whitespace_and_case() {
        assert_eq!(normalize_text(" 사회복지사 2급\t후기 "), Some("사회복지사2급후기".to_string()));
        assert_eq!(normalize_text("Hello World"), Some("helloworld".to_string()));
        assert_eq!(normalize_text("   "), None);
    }

    #[test]
    fn url_key_strips_scheme_slash_query_and_aliases() {
        assert_eq!(
            url_key("https://m.blog.naver.com/WindUSJ/223344?utm_source=x#top"),
            Some("blog.naver.com/windusj/223344".to_string())
        );
        assert_eq!(
            url_key("http://www.example.com/about/"),
            Some("example.com/about".to_string())
        );
        assert_eq!(url_key("blog.naver.com/windusj/"), Some("blog.naver.com/windusj".to_string()));
        assert_eq!(url_key("not a url"), None);
        assert_eq!(url_key("windusj"), None);
    }

    #[test]
    fn postview_links_share_key_with_path_links() {
        assert_eq!(
            url_key("https://blog.naver.com/PostView.naver?blogId=windusj&logNo=223344"),
            url_key("https://m.blog.naver.com/windusj/223344")
        );
    }

    #[test]
    fn handle_from_link_reads_account_hosts_only() {
        assert_eq!(
            handle_from_link("https://blog.naver.com/windusj/223344"),
            Some("windusj".to_string())
        );
        assert_eq!(
            handle_from_link("https://m.blog.naver.com/PostView.naver?blogId=windusj&logNo=1"),
            Some("windusj".to_string())
        );
        assert_eq!(
            handle_from_link("https://in.naver.com/socialwork"),
            Some("socialwork".to_string())
        );
        assert_eq!(handle_from_link("https://cafe.naver.com/windusj"), None);
        assert_eq!(handle_from_link("https://blog.naver.com/"), None);
    }

    #[test]
    fn record_identifiers_follow_priority_and_dedupe() {
        let mut r = record("windusj");
        r.author = Some("윈드 유에스제이".into());
        r.title = Some("사회복지사 2급 후기".into());
        r.link = Some("https://blog.naver.com/windusj/223344".into());
        r.linked_accounts = vec!["windusj".into(), "https://in.naver.com/windusj_in".into()];

        let kinds: Vec<_> = record_identifiers(&r).into_iter().map(|i| (i.kind, i.token)).collect();
        assert_eq!(
            kinds,
            vec![
                (IdentifierKind::Handle, "windusj".to_string()),
                (IdentifierKind::Name, "윈드유에스제이".to_string()),
                (IdentifierKind::Title, "사회복지사2급후기".to_string()),
                (IdentifierKind::Url, "blog.naver.com/windusj/223344".to_string()),
                (IdentifierKind::LinkedAccount, "windusj_in".to_string()),
                (IdentifierKind::LinkedAccount, "in.naver.com/windusj_in".to_string()),
            ]
        );
    }

    #[test]
    fn non_handle_id_is_skipped() {
        let mut r = record("홍길동");
        r.author = Some("홍길동".into());
        let ids = record_identifiers(&r);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].kind, IdentifierKind::Name);
    }

    #[test]
    fn entry_identifiers_union_every_field() {
        let mut e = entry("https://blog.naver.com/PostView.naver?blogId=windusj&logNo=7");
        e.profile_link = Some("https://blog.naver.com/windusj".into());
        e.nickname = Some("윈드 유".into());
        e.external_id = Some("WINDUSJ".into());

        let set = entry_identifiers(&e);
        assert!(set.contains("windusj"));
        assert!(set.contains("blog.naver.com/windusj/7"));
        assert!(set.contains("blog.naver.com/windusj"));
        assert!(set.contains("윈드유"));
        assert!(set.contains("사회복지사2급취득후기"));
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn representations_of_one_account_share_a_token() {
        let mut by_link = record("someone_else");
        by_link.link = Some("https://m.blog.naver.com/windusj/223344".into());
        let mut scraped = entry("https://blog.naver.com/other/1");
        scraped.profile_link = Some("https://blog.naver.com/WindUSJ".into());

        assert!(record_identifier_set(&by_link).shares_token_with(&entry_identifiers(&scraped)));

        let by_handle = record("windusj");
        let postview = entry("https://blog.naver.com/PostView.naver?blogId=windusj&logNo=9");
        assert!(record_identifier_set(&by_handle).shares_token_with(&entry_identifiers(&postview)));
    }
}
