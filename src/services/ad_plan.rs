// Feed planning: interleave ad banners into an ordered content list

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{Advertisement, ContentEntry};

pub const DEFAULT_ADS_PER_BANNER: usize = 3;

/// Where banners go and how many ads each one carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConfig {
    /// 1-based content positions after which a banner may be inserted
    pub positions: BTreeSet<usize>,
    pub ads_per_banner: usize,
}

impl PlanConfig {
    pub fn new(positions: impl IntoIterator<Item = usize>, ads_per_banner: usize) -> Self {
        Self {
            positions: positions.into_iter().collect(),
            ads_per_banner: ads_per_banner.max(1),
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self::new([3, 8], DEFAULT_ADS_PER_BANNER)
    }
}

/// One element of the rendered feed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum PlanNode {
    Content(ContentEntry),
    AdBanner {
        /// 0-based index of the content entry this banner follows
        after_index: usize,
        ads: Vec<Advertisement>,
    },
}

impl PlanNode {
    pub fn is_banner(&self) -> bool {
        matches!(self, PlanNode::AdBanner { .. })
    }
}

/// Merge `content` with slices of the `ads` pool.
///
/// After the content entry at 1-based position `i`, a banner is emitted when
/// `i` is a configured position, at least one content entry follows it, and
/// the pool is not yet exhausted. Each banner takes the next
/// `ads_per_banner` ads in pool order, or whatever is left.
pub fn build_insertion_plan(
    content: &[ContentEntry],
    ads: &[Advertisement],
    config: &PlanConfig,
) -> Vec<PlanNode> {
    let mut plan = Vec::with_capacity(content.len() + config.positions.len());
    let mut cursor = 0;
    let per_banner = config.ads_per_banner.max(1);

    for (index, entry) in content.iter().enumerate() {
        plan.push(PlanNode::Content(entry.clone()));

        let position = index + 1;
        if position >= content.len() || !config.positions.contains(&position) {
            continue;
        }
        if cursor >= ads.len() {
            continue;
        }

        let end = (cursor + per_banner).min(ads.len());
        plan.push(PlanNode::AdBanner {
            after_index: index,
            ads: ads[cursor..end].to_vec(),
        });
        cursor = end;
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(n: usize) -> Vec<ContentEntry> {
        (0..n)
            .map(|i| ContentEntry {
                id: format!("c{}", i),
                title: format!("Title {}", i),
                thumbnail_url: None,
                content_type: "movie".to_string(),
                duration: 600,
                views: 0,
                is_featured: false,
                category: None,
                created_at: "2024-01-01T00:00:00Z".to_string(),
            })
            .collect()
    }

    fn ads(n: usize) -> Vec<Advertisement> {
        (0..n)
            .map(|i| Advertisement {
                id: format!("a{}", i),
                title: format!("Ad {}", i),
                description: None,
                thumbnail_url: Some(format!("https://cdn/ad{}.jpg", i)),
                video_url: None,
                duration: None,
                is_skippable: false,
                skip_after_seconds: None,
                cta_text: None,
                cta_url: None,
                created_at: "2024-01-01T00:00:00Z".to_string(),
            })
            .collect()
    }

    fn ids(plan: &[PlanNode]) -> Vec<String> {
        plan.iter()
            .map(|node| match node {
                PlanNode::Content(c) => c.id.clone(),
                PlanNode::AdBanner { ads, .. } => {
                    let ids: Vec<_> = ads.iter().map(|a| a.id.as_str()).collect();
                    format!("[{}]", ids.join(","))
                }
            })
            .collect()
    }

    #[test]
    fn test_banners_at_configured_positions() {
        let plan = build_insertion_plan(&content(10), &ads(6), &PlanConfig::default());

        assert_eq!(
            ids(&plan),
            vec![
                "c0", "c1", "c2", "[a0,a1,a2]", "c3", "c4", "c5", "c6", "c7", "[a3,a4,a5]", "c8",
                "c9"
            ]
        );

        match &plan[3] {
            PlanNode::AdBanner { after_index, .. } => assert_eq!(*after_index, 2),
            other => panic!("expected banner, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_banner_when_pool_runs_low() {
        let plan = build_insertion_plan(&content(10), &ads(4), &PlanConfig::default());

        let banners: Vec<_> = plan.iter().filter(|n| n.is_banner()).collect();
        assert_eq!(banners.len(), 2);
        assert_eq!(
            ids(&plan),
            vec!["c0", "c1", "c2", "[a0,a1,a2]", "c3", "c4", "c5", "c6", "c7", "[a3]", "c8", "c9"]
        );
    }

    #[test]
    fn test_pool_exhausted_before_later_position() {
        let plan = build_insertion_plan(&content(10), &ads(3), &PlanConfig::default());
        assert_eq!(plan.iter().filter(|n| n.is_banner()).count(), 1);
        assert_eq!(plan.len(), 11);
    }

    #[test]
    fn test_empty_pool_is_identity() {
        let items = content(5);
        let plan = build_insertion_plan(&items, &[], &PlanConfig::default());

        let expected: Vec<_> = items.into_iter().map(PlanNode::Content).collect();
        assert_eq!(plan, expected);
    }

    #[test]
    fn test_empty_content() {
        assert!(build_insertion_plan(&[], &ads(3), &PlanConfig::default()).is_empty());
    }

    #[test]
    fn test_position_at_or_past_end_never_fires() {
        let config = PlanConfig::new([3, 8], 3);
        // Only 3 entries: position 3 would trail the feed
        let plan = build_insertion_plan(&content(3), &ads(6), &config);
        assert!(!plan.iter().any(PlanNode::is_banner));

        let plan = build_insertion_plan(&content(8), &ads(6), &config);
        assert_eq!(plan.iter().filter(|n| n.is_banner()).count(), 1);
    }

    #[test]
    fn test_duplicate_and_zero_positions() {
        let config = PlanConfig::new([0, 2, 2, 2], 2);
        let plan = build_insertion_plan(&content(4), &ads(6), &config);
        assert_eq!(ids(&plan), vec!["c0", "c1", "[a0,a1]", "c2", "c3"]);
    }

    #[test]
    fn test_zero_ads_per_banner_is_clamped() {
        let config = PlanConfig::new([1], 0);
        assert_eq!(config.ads_per_banner, 1);
        let plan = build_insertion_plan(&content(2), &ads(2), &config);
        assert_eq!(ids(&plan), vec!["c0", "[a0]", "c1"]);
    }
}
