//! Selector cascades for the search results page.
//!
//! Markup changes without notice, so every field is read through an ordered
//! list of selectors and the first non-empty value wins. Newer layouts come
//! first; older ones stay as fallbacks.

use scraper::{ElementRef, Selector};
use url::Url;

/// Smart block containers, in preference order.
pub const BLOCK_ROOTS: &[&str] = &[
    "#main_pack .api_subject_bx",
    "#main_pack [data-block-id]",
    "#main_pack section.sc_new",
];

/// Any of these present means at least one smart block has rendered. The
/// bare `#main_pack` shell appears before its blocks do, so it is not one.
pub const CONTENT_ROOTS: &[&str] = BLOCK_ROOTS;

/// Item containers inside one block.
pub const ITEM_ROOTS: &[&str] = &[
    ".fds-ugc-block-mod",
    "li.bx",
    ".api_ugc_item",
    ".view_wrap",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// Trimmed text content with internal whitespace collapsed.
    Text,
    /// `href` resolved against the results page origin.
    Href,
}

/// One field's prioritized selector list.
#[derive(Debug, Clone, Copy)]
pub struct FieldCascade {
    pub name: &'static str,
    pub selectors: &'static [&'static str],
    pub read: Read,
}

pub const BLOCK_TITLE: FieldCascade = FieldCascade {
    name: "block_title",
    selectors: &[
        ".fds-comps-header-headline",
        ".api_title",
        ".title_area h2",
        "h2",
        "h3",
    ],
    read: Read::Text,
};

pub const ITEM_TITLE: FieldCascade = FieldCascade {
    name: "title",
    selectors: &[
        ".fds-comps-right-image-text-title",
        "a.title_link",
        "a.api_txt_lines.total_tit",
        ".total_tit",
        ".title_area a",
    ],
    read: Read::Text,
};

pub const ITEM_CONTENT: FieldCascade = FieldCascade {
    name: "content",
    selectors: &[
        ".fds-comps-right-image-text-content",
        ".dsc_link",
        ".api_txt_lines.dsc_txt",
        ".dsc_txt",
    ],
    read: Read::Text,
};

pub const ITEM_LINK: FieldCascade = FieldCascade {
    name: "link",
    selectors: &[
        "a.fds-comps-right-image-text-title",
        "a.title_link",
        "a.api_txt_lines.total_tit",
        "a.total_tit",
        ".title_area a",
    ],
    read: Read::Href,
};

pub const ITEM_PROFILE_LINK: FieldCascade = FieldCascade {
    name: "profile_link",
    selectors: &[
        "a.fds-info-inner-text",
        ".user_info > a",
        ".user_box a.name",
        "a.sub_thumb",
        "a.thumb_single",
    ],
    read: Read::Href,
};

pub const ITEM_NICKNAME: FieldCascade = FieldCascade {
    name: "nickname",
    selectors: &[
        ".fds-info-inner-text span",
        "a.fds-info-inner-text",
        ".user_info .name",
        ".user_box .name",
        ".sub_txt.sub_name",
    ],
    read: Read::Text,
};

impl FieldCascade {
    /// First non-empty value within `scope`.
    pub fn resolve(&self, scope: ElementRef<'_>, base: &Url) -> Option<String> {
        self.selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .find_map(|selector| {
                scope
                    .select(&selector)
                    .find_map(|el| read_field(el, self.read, base))
            })
    }
}

/// Elements matched by the first selector in `cascade` that matches any.
pub fn first_matching<'a>(scope: ElementRef<'a>, cascade: &[&str]) -> Vec<ElementRef<'a>> {
    cascade
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .map(|selector| scope.select(&selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

fn read_field(el: ElementRef<'_>, read: Read, base: &Url) -> Option<String> {
    match read {
        Read::Text => {
            let text = el.text().collect::<Vec<_>>().join(" ");
            let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!collapsed.is_empty()).then_some(collapsed)
        }
        Read::Href => {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                return None;
            }
            base.join(href).ok().map(String::from)
        }
    }
}

/// Script that reports whether any content root is present.
pub fn content_probe_script() -> String {
    let roots = serde_json::to_string(CONTENT_ROOTS).unwrap_or_else(|_| "[]".to_string());
    format!("{roots}.some((s) => document.querySelector(s) !== null)")
}
