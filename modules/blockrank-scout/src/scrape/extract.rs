use scraper::{ElementRef, Html};
use url::Url;

use blockrank_common::{Block, Item};

use super::selectors::{
    first_matching, BLOCK_ROOTS, BLOCK_TITLE, ITEM_CONTENT, ITEM_LINK, ITEM_NICKNAME,
    ITEM_PROFILE_LINK, ITEM_ROOTS, ITEM_TITLE,
};
use crate::identity::handle_from_link;

/// Only the top of the page is considered.
pub const MAX_BLOCKS: usize = 4;

const RESULTS_ORIGIN: &str = "https://search.naver.com/";

/// Smart blocks in page order from a captured results page.
pub fn extract_blocks(html: &str) -> Vec<Block> {
    let Ok(base) = Url::parse(RESULTS_ORIGIN) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    first_matching(document.root_element(), BLOCK_ROOTS)
        .into_iter()
        .take(MAX_BLOCKS)
        .enumerate()
        .map(|(i, root)| extract_block(root, i + 1, &base))
        .collect()
}

fn extract_block(root: ElementRef<'_>, position: usize, base: &Url) -> Block {
    let title = BLOCK_TITLE
        .resolve(root, base)
        .unwrap_or_else(|| format!("Block {position}"));

    let items = first_matching(root, ITEM_ROOTS)
        .into_iter()
        .filter_map(|item| extract_item(item, base))
        .collect();

    Block { title, items }
}

/// `None` when the item has no title.
fn extract_item(root: ElementRef<'_>, base: &Url) -> Option<Item> {
    let title = ITEM_TITLE.resolve(root, base)?;
    let link = ITEM_LINK.resolve(root, base).unwrap_or_default();
    let profile_link = ITEM_PROFILE_LINK.resolve(root, base).unwrap_or_default();
    let external_id = handle_from_link(&link).or_else(|| handle_from_link(&profile_link));

    Some(Item {
        title,
        content: ITEM_CONTENT.resolve(root, base).unwrap_or_default(),
        link,
        profile_link,
        external_id,
        nickname: ITEM_NICKNAME.resolve(root, base),
    })
}
