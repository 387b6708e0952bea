//! Resolve scraped entries to a stored record.
//!
//! Two passes over the record's identifiers in priority order: exact token
//! equality first, then substring containment for identifiers of at least
//! [`MIN_CONTAINMENT_LEN`] bytes. Containment catches URL and handle variants
//! but can also pair two distinct accounts that share a long substring; treat
//! a match as best-effort evidence, not authoritative identity.

use blockrank_common::{Record, ScrapedEntry};

use crate::identity::{entry_identifiers, record_identifiers, Identifier, IdentifierSet};

/// Shortest identifier (UTF-8 bytes) allowed to match by containment.
/// Bytes rather than chars so a three-syllable Hangul name qualifies.
pub const MIN_CONTAINMENT_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Contains,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Contains => "contains",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult<'a> {
    pub entry: &'a ScrapedEntry,
    /// The record identifier that satisfied the match.
    pub identifier: Identifier,
    pub kind: MatchKind,
}

/// Find the best-ranked entry that refers to `record`.
pub fn find_match<'a>(entries: &'a [ScrapedEntry], record: &Record) -> Option<MatchResult<'a>> {
    let candidates = in_rank_order(entries);
    let identifiers = record_identifiers(record);

    for identifier in &identifiers {
        if let Some((entry, _)) = candidates
            .iter()
            .find(|(_, set)| set.contains(&identifier.token))
        {
            return Some(MatchResult {
                entry,
                identifier: identifier.clone(),
                kind: MatchKind::Exact,
            });
        }
    }

    for identifier in identifiers
        .iter()
        .filter(|i| i.token.len() >= MIN_CONTAINMENT_LEN)
    {
        if let Some((entry, _)) = candidates
            .iter()
            .find(|(_, set)| set.any_contains(&identifier.token))
        {
            return Some(MatchResult {
                entry,
                identifier: identifier.clone(),
                kind: MatchKind::Contains,
            });
        }
    }

    None
}

/// Entries with their identifier sets, stably sorted by rank so equal ranks
/// keep scrape order.
fn in_rank_order(entries: &[ScrapedEntry]) -> Vec<(&ScrapedEntry, IdentifierSet)> {
    let mut candidates: Vec<_> = entries
        .iter()
        .map(|entry| (entry, entry_identifiers(entry)))
        .collect();
    candidates.sort_by_key(|(entry, _)| entry.rank);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentifierKind;

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

    fn entry(rank: u32, title: &str, link: &str) -> ScrapedEntry {
        ScrapedEntry {
            keyword: "사회복지사2급".to_string(),
            external_id: None,
            title: title.to_string(),
            link: link.to_string(),
            profile_link: None,
            rank,
            nickname: None,
            snippet: None,
            block_title: "인기글".to_string(),
        }
    }

    #[test]
    fn profile_link_resolves_handle_at_block_position() {
        let mut second = entry(2, "2급 실습 후기", "https://blog.naver.com/other/1");
        second.profile_link = Some("https://blog.naver.com/windusj".into());
        let entries = vec![
            entry(1, "사회복지사 공부법", "https://blog.naver.com/someone/5"),
            second,
        ];

        let result = find_match(&entries, &record("windusj")).unwrap();
        assert_eq!(result.entry.rank, 2);
        assert_eq!(result.kind, MatchKind::Exact);
        assert_eq!(result.identifier.kind, IdentifierKind::Handle);
    }

    #[test]
    fn no_shared_identifier_is_not_exposed() {
        let entries = vec![
            entry(1, "사회복지사 공부법", "https://blog.naver.com/someone/5"),
            entry(2, "2급 실습 후기", "https://blog.naver.com/other/1"),
        ];
        assert!(find_match(&entries, &record("windusj")).is_none());
    }

    #[test]
    fn nickname_containing_author_matches() {
        let mut r = record("홍길동");
        r.author = Some("홍길동".into());
        let mut e = entry(3, "자격증 후기", "https://example.com/post");
        e.nickname = Some("홍길동abc".into());
        let entries = vec![entry(1, "다른 글", "https://example.com/a"), e];

        let result = find_match(&entries, &r).unwrap();
        assert_eq!(result.entry.rank, 3);
        assert_eq!(result.kind, MatchKind::Contains);
        assert_eq!(result.identifier.kind, IdentifierKind::Name);
    }

    #[test]
    fn exact_match_beats_better_ranked_containment() {
        let mut contains = entry(1, "글", "https://example.com/1");
        contains.nickname = Some("windusj_fan".into());
        let mut exact = entry(4, "글", "https://example.com/2");
        exact.nickname = Some("windusj".into());
        let entries = vec![contains, exact];

        let result = find_match(&entries, &record("windusj")).unwrap();
        assert_eq!(result.entry.rank, 4);
        assert_eq!(result.kind, MatchKind::Exact);
    }

    #[test]
    fn short_identifiers_never_match_by_containment() {
        let mut e = entry(1, "글", "https://example.com/1");
        e.nickname = Some("abcdxyz".into());
        assert!(find_match(&[e.clone()], &record("abcd")).is_none());

        let mut five = record("abcdx");
        five.author = None;
        assert!(find_match(&[e], &five).is_some());
    }

    #[test]
    fn equal_ranks_prefer_scrape_order() {
        let mut first = entry(1, "글 하나", "https://example.com/1");
        first.nickname = Some("windusj".into());
        first.block_title = "인기글".into();
        let mut second = entry(1, "글 둘", "https://example.com/2");
        second.nickname = Some("windusj".into());
        second.block_title = "브랜드 콘텐츠".into();

        let entries = vec![second.clone(), first];
        let result = find_match(&entries, &record("windusj")).unwrap();
        assert_eq!(result.entry.block_title, "브랜드 콘텐츠");
    }

    #[test]
    fn lower_rank_in_later_block_wins_over_higher_rank() {
        let mut deep = entry(5, "글", "https://example.com/1");
        deep.nickname = Some("windusj".into());
        let mut shallow = entry(2, "글", "https://example.com/2");
        shallow.nickname = Some("windusj".into());
        let entries = vec![deep, shallow];

        assert_eq!(find_match(&entries, &record("windusj")).unwrap().entry.rank, 2);
    }

    #[test]
    fn matching_is_deterministic() {
        let mut e1 = entry(1, "사회복지사 2급 후기", "https://blog.naver.com/aaa/1");
        e1.nickname = Some("windusj블로그".into());
        let mut e2 = entry(1, "windusj 일기", "https://blog.naver.com/bbb/2");
        e2.nickname = Some("bbb".into());
        let entries = vec![e1, e2];
        let r = record("windusj");

        let first = find_match(&entries, &r);
        for _ in 0..20 {
            assert_eq!(find_match(&entries, &r), first);
        }
    }

    #[test]
    fn linked_account_is_last_resort() {
        let mut r = record("windusj");
        r.linked_accounts = vec!["https://in.naver.com/windusj_in".into()];
        let mut e = entry(2, "글", "https://in.naver.com/windusj_in/contents/1");
        e.nickname = Some("다른사람".into());

        let entries = [e];
        let result = find_match(&entries, &r).unwrap();
        assert_eq!(result.identifier.kind, IdentifierKind::LinkedAccount);
        assert_eq!(result.kind, MatchKind::Exact);
    }
}
