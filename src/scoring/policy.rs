/// Score below which a document is worth re-extracting.
pub const DEFAULT_ENRICH_THRESHOLD: u8 = 55;

/// Minimum score gain before enrichment overwrites stored content. The band
/// keeps near-tied scores from oscillating between re-enrichments.
pub const IMPROVEMENT_MARGIN: u8 = 10;

#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    pub threshold: u8,
    /// Documents without a URL (e.g. email captures) cannot be re-rendered.
    pub has_url: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ENRICH_THRESHOLD,
            has_url: true,
        }
    }
}

/// Whether a freshly scored document should be queued for enrichment.
pub fn should_enrich(score: u8, options: &EnrichOptions) -> bool {
    options.has_url && score < options.threshold
}

/// Whether a re-extraction result justifies overwriting stored content.
///
/// Content appearing where there was none always wins; otherwise the new
/// score must clear the old one by the full margin.
pub fn is_improvement(
    old_score: u8,
    new_score: u8,
    old_content_present: bool,
    new_content_present: bool,
) -> bool {
    if !old_content_present && new_content_present {
        return true;
    }
    new_score >= old_score.saturating_add(IMPROVEMENT_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_enrich_below_threshold() {
        let options = EnrichOptions::default();
        assert!(should_enrich(0, &options));
        assert!(should_enrich(54, &options));
        assert!(!should_enrich(55, &options));
        assert!(!should_enrich(100, &options));
    }

    #[test]
    fn test_should_enrich_never_without_url() {
        let options = EnrichOptions {
            has_url: false,
            ..Default::default()
        };
        for score in [0, 10, 54, 55, 100] {
            assert!(!should_enrich(score, &options));
        }
    }

    #[test]
    fn test_should_enrich_respects_custom_threshold() {
        let options = EnrichOptions {
            threshold: 70,
            has_url: true,
        };
        assert!(should_enrich(69, &options));
        assert!(!should_enrich(70, &options));
    }

    #[test]
    fn test_improvement_requires_full_margin() {
        assert!(is_improvement(40, 55, true, true));
        assert!(is_improvement(40, 50, true, true));
        assert!(!is_improvement(40, 49, true, true));
        assert!(!is_improvement(40, 45, true, true));
    }

    #[test]
    fn test_content_from_absent_to_present_always_improves() {
        assert!(is_improvement(30, 35, false, true));
        assert!(is_improvement(90, 0, false, true));
    }

    #[test]
    fn test_no_new_content_falls_back_to_margin() {
        assert!(!is_improvement(30, 35, false, false));
        assert!(is_improvement(30, 40, true, false));
    }
}
