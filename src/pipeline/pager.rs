//! Signature Pager (C2, §4.2). Walks the full signature list for a wallet
//! newest→oldest, tolerating up to 3 consecutive empty pages (version-0
//! skips) before terminating.

use std::sync::Arc;

use crate::error::WalletDocResult;
use crate::rpc::UpstreamRpcClient;

const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 3;

pub struct SignaturePager {
    client: Arc<UpstreamRpcClient>,
    wallet: String,
    max_pages: Option<u32>,
}

impl SignaturePager {
    pub fn new(client: Arc<UpstreamRpcClient>, wallet: String, max_pages: Option<u32>) -> Self {
        Self {
            client,
            wallet,
            max_pages,
        }
    }

    /// Collects the full ordered (newest→oldest) signature sequence,
    /// applying the termination conditions in §4.2 in order: (a) no
    /// `next_cursor`, (b) > 3 consecutive empty pages, (c) `max_pages`.
    pub async fn collect_all(&self) -> WalletDocResult<Vec<String>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        let mut consecutive_empty: u32 = 0;
        let mut pages_fetched: u32 = 0;

        loop {
            if let Some(max) = self.max_pages {
                if pages_fetched >= max {
                    break;
                }
            }

            let page = self
                .client
                .get_signatures(&self.wallet, cursor.as_deref())
                .await?;
            pages_fetched += 1;

            if page.signatures.is_empty() {
                consecutive_empty += 1;
                if consecutive_empty > MAX_CONSECUTIVE_EMPTY_PAGES {
                    break;
                }
            } else {
                consecutive_empty = 0;
                all.extend(page.signatures);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    //! Exercises the empty-page-tolerance state machine (§8 property 5,
    //! S4) directly against a scripted page sequence, without a network
    //! client.

    const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 3;

    struct ScriptedPage {
        signatures: Vec<&'static str>,
        next_cursor: Option<&'static str>,
    }

    fn run(pages: Vec<ScriptedPage>) -> Vec<&'static str> {
        let mut all = Vec::new();
        let mut consecutive_empty = 0u32;
        for page in pages {
            if page.signatures.is_empty() {
                consecutive_empty += 1;
                if consecutive_empty > MAX_CONSECUTIVE_EMPTY_PAGES {
                    break;
                }
            } else {
                consecutive_empty = 0;
                all.extend(page.signatures);
            }
            if page.next_cursor.is_none() {
                break;
            }
        }
        all
    }

    #[test]
    fn s4_empty_page_tolerant_paging() {
        let pages = vec![
            ScriptedPage {
                signatures: (0..1000).map(|_| "a").collect(),
                next_cursor: Some("b"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: Some("c"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: Some("d"),
            },
            ScriptedPage {
                signatures: (0..500).map(|_| "d").collect(),
                next_cursor: Some("e"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: None,
            },
        ];
        assert_eq!(run(pages).len(), 1500);
    }

    #[test]
    fn terminates_after_four_consecutive_empty_pages() {
        let pages = vec![
            ScriptedPage {
                signatures: vec!["a"],
                next_cursor: Some("b"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: Some("c"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: Some("d"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: Some("e"),
            },
            ScriptedPage {
                signatures: vec![],
                next_cursor: Some("f"),
            },
            ScriptedPage {
                signatures: vec!["never reached"],
                next_cursor: None,
            },
        ];
        assert_eq!(run(pages), vec!["a"]);
    }
}
