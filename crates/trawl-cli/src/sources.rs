//! Compiled-in source table and its environment overrides.

use trawl_client::{ListingSelectors, SelectorExtractor};
use trawl_core::{AppError, SourceDescriptor};
use url::Url;

struct BuiltinSource {
    id: &'static str,
    url: &'static str,
    requires_render: bool,
    item: &'static str,
    title: &'static str,
    link: Option<&'static str>,
    price: Option<&'static str>,
    posted_at: Option<&'static str>,
}

impl BuiltinSource {
    fn selectors(&self) -> ListingSelectors {
        let mut selectors = ListingSelectors::new(self.item, self.title);
        if let Some(link) = self.link {
            selectors = selectors.with_link(link);
        }
        if let Some(price) = self.price {
            selectors = selectors.with_price(price);
        }
        if let Some(posted_at) = self.posted_at {
            selectors = selectors.with_posted_at(posted_at);
        }
        selectors
    }
}

const BUILTIN_SOURCES: &[BuiltinSource] = &[
    BuiltinSource {
        id: "clien",
        url: "https://www.clien.net/service/board/jirum",
        requires_render: false,
        item: "div.list_item.symph_row.jirum",
        title: "span.list_subject",
        link: Some("a[data-role='list-title-text']"),
        price: None,
        posted_at: Some("div.list_time span.time.popover span.timestamp"),
    },
    BuiltinSource {
        id: "ppomppu",
        url: "https://www.ppomppu.co.kr/zboard/zboard.php?id=ppomppu",
        requires_render: false,
        item: "tr.baseList.bbs_new1",
        title: "div.baseList-cover a.baseList-title",
        link: None,
        price: None,
        posted_at: Some("time.baseList-time"),
    },
    BuiltinSource {
        id: "quasar",
        url: "https://quasarzone.com/bbs/qb_saleinfo",
        requires_render: false,
        item: "div.market-type-list.market-info-type-list.relative table tbody tr",
        title: "div.market-info-list-cont p.tit a.subject-link span.ellipsis-with-reply-cnt",
        link: Some("div.market-info-list-cont p.tit a.subject-link"),
        price: Some("div.market-info-list-cont div.market-info-sub p span.text-orange"),
        posted_at: Some("span.date"),
    },
    BuiltinSource {
        id: "ruliweb",
        url: "https://bbs.ruliweb.com/market/board/1020",
        requires_render: false,
        item: "tr.table_body.normal",
        title: "td.subject a.subject_link, div.title_wrapper a.subject_link",
        link: None,
        price: None,
        posted_at: Some("div.article_info span.time"),
    },
    BuiltinSource {
        id: "coolandjoy",
        url: "https://coolenjoy.net/bbs/jirum",
        requires_render: false,
        item: "ul.na-table li",
        title: "a.na-subject",
        link: None,
        price: Some("div.float-right font"),
        posted_at: None,
    },
    BuiltinSource {
        id: "damoang",
        url: "https://damoang.net/economy",
        requires_render: false,
        item: "section#bo_list ul.list-group li:not(.hd-wrap):not(.da-atricle-row--notice)",
        title: "a.da-link-block.da-article-link.subject-ellipsis",
        link: None,
        price: None,
        posted_at: Some("span.orangered.da-list-date"),
    },
    BuiltinSource {
        id: "arca",
        url: "https://arca.live/b/hotdeal",
        requires_render: false,
        item: "div.list-table.hybrid div.vrow.hybrid",
        title: "div.vrow-inner div.vrow-top.deal a.title.hybrid-title",
        link: None,
        price: Some("span.deal-price"),
        posted_at: Some("span.col-time time"),
    },
    BuiltinSource {
        id: "fmkorea",
        url: "https://www.fmkorea.com/hotdeal",
        requires_render: true,
        item: "ul li.li",
        title: "h3.title a",
        link: None,
        price: None,
        posted_at: Some("div span.regdate"),
    },
];

/// Enabled sources plus an extractor that knows all of them.
#[derive(Clone)]
pub struct SourceSet {
    pub sources: Vec<SourceDescriptor>,
    pub extractor: SelectorExtractor,
}

/// Apply `TRAWL_SOURCE_<ID>_URL` / `TRAWL_SOURCE_<ID>_ENABLED` overrides read
/// through `lookup` and validate the result.
pub fn load_sources<L>(lookup: L) -> Result<SourceSet, AppError>
where
    L: Fn(&str) -> Option<String>,
{
    let mut sources = Vec::new();
    let mut extractor = SelectorExtractor::new();

    for builtin in BUILTIN_SOURCES {
        let prefix = format!("TRAWL_SOURCE_{}", builtin.id.to_ascii_uppercase());

        if let Some(raw) = lookup(&format!("{prefix}_ENABLED")) {
            let enabled = parse_bool(&raw).ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Invalid {prefix}_ENABLED '{raw}': expected a boolean"
                ))
            })?;
            if !enabled {
                tracing::debug!(source = builtin.id, "Source disabled");
                continue;
            }
        }

        let url = lookup(&format!("{prefix}_URL")).unwrap_or_else(|| builtin.url.to_string());
        Url::parse(&url).map_err(|e| {
            AppError::ConfigError(format!("Invalid URL for source '{}': {e}", builtin.id))
        })?;

        extractor = extractor.with_source(builtin.id, &builtin.selectors())?;
        sources.push(
            SourceDescriptor::new(builtin.id, url).with_requires_render(builtin.requires_render),
        );
    }

    if sources.is_empty() {
        return Err(AppError::ConfigError(
            "All sources are disabled; enable at least one".into(),
        ));
    }

    Ok(SourceSet { sources, extractor })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_builtin_table_compiles() {
        let set = load_sources(env(&[])).unwrap();
        assert_eq!(set.sources.len(), BUILTIN_SOURCES.len());
        let fmkorea = set.sources.iter().find(|s| s.id == "fmkorea").unwrap();
        assert!(fmkorea.requires_render);
    }

    #[test]
    fn test_url_override_and_disable() {
        let set = load_sources(env(&[
            ("TRAWL_SOURCE_CLIEN_URL", "https://mirror.test/jirum"),
            ("TRAWL_SOURCE_ARCA_ENABLED", "false"),
        ]))
        .unwrap();

        let clien = set.sources.iter().find(|s| s.id == "clien").unwrap();
        assert_eq!(clien.url, "https://mirror.test/jirum");
        assert!(set.sources.iter().all(|s| s.id != "arca"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = load_sources(env(&[("TRAWL_SOURCE_QUASAR_URL", "not a url")]));
        assert!(matches!(result, Err(AppError::ConfigError(msg)) if msg.contains("quasar")));
    }

    #[test]
    fn test_invalid_enabled_flag_rejected() {
        let result = load_sources(env(&[("TRAWL_SOURCE_CLIEN_ENABLED", "maybe")]));
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_all_disabled_is_error() {
        let pairs: Vec<(String, String)> = BUILTIN_SOURCES
            .iter()
            .map(|s| {
                (
                    format!("TRAWL_SOURCE_{}_ENABLED", s.id.to_ascii_uppercase()),
                    "0".to_string(),
                )
            })
            .collect();
        let refs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        assert!(matches!(
            load_sources(env(&refs)),
            Err(AppError::ConfigError(_))
        ));
    }
}
