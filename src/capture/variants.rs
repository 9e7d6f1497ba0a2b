use crate::browser::driver::ImageHandle;
use crate::browser::snapshot::PageState;
use crate::capture::capture_model::{PageVariant, VariantKind};

/// Page variants observed on one page, in discovery order.
///
/// The default variant is always present and always first. Further variants
/// are keyed by how their page state differs from the baseline, so observing
/// the same page-wide change twice records it once.
#[derive(Debug, Clone)]
pub struct VariantLog {
    page_url: String,
    baseline: PageState,
    variants: Vec<PageVariant>,
}

impl VariantLog {
    pub fn new(page_url: &str, baseline: PageState, default_shot: Option<ImageHandle>) -> Self {
        let default = PageVariant {
            name: "default".to_string(),
            kind: VariantKind::Default,
            order: 0.0,
            notes: describe(&baseline),
            screenshot_ref: default_shot,
            page_url: page_url.to_string(),
        };

        Self {
            page_url: page_url.to_string(),
            baseline,
            variants: vec![default],
        }
    }

    /// Rebuild from variants persisted in a checkpoint.
    pub fn resume(page_url: &str, baseline: PageState, mut variants: Vec<PageVariant>) -> Self {
        variants.sort_by(|a, b| a.order.total_cmp(&b.order));
        if variants.first().map(|v| v.kind) != Some(VariantKind::Default) {
            let mut log = Self::new(page_url, baseline, None);
            for mut v in variants.into_iter().filter(|v| v.kind != VariantKind::Default) {
                v.order = log.variants.len() as f64;
                log.variants.push(v);
            }
            return log;
        }

        Self {
            page_url: page_url.to_string(),
            baseline,
            variants,
        }
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn baseline(&self) -> &PageState {
        &self.baseline
    }

    pub fn variants(&self) -> &[PageVariant] {
        &self.variants
    }

    pub fn into_variants(self) -> Vec<PageVariant> {
        self.variants
    }

    /// True when `state` differs from the baseline and was not seen before.
    pub fn is_new(&self, state: &PageState) -> bool {
        match variant_name(&self.baseline, state) {
            Some(name) => !self.variants.iter().any(|v| v.name == name),
            None => false,
        }
    }

    /// Record a page-wide state change. Returns the new variant, or `None`
    /// when the state is the baseline or already recorded.
    pub fn observe(&mut self, state: &PageState, trigger: &str, shot: Option<ImageHandle>) -> Option<&PageVariant> {
        if !self.is_new(state) {
            return None;
        }
        let name = variant_name(&self.baseline, state)?;

        self.variants.push(PageVariant {
            kind: variant_kind(&self.baseline, state),
            order: self.variants.len() as f64,
            notes: format!("reached via {}; {}", trigger, describe(state)),
            screenshot_ref: shot,
            page_url: self.page_url.clone(),
            name,
        });
        self.variants.last()
    }
}

fn variant_name(baseline: &PageState, state: &PageState) -> Option<String> {
    let mut parts = Vec::new();
    if state.theme != baseline.theme {
        parts.push(format!("theme: {}", state.theme.as_deref().unwrap_or("none")));
    }
    if state.layout != baseline.layout {
        parts.push(format!("layout: {}", state.layout.as_deref().unwrap_or("none")));
    }

    if parts.is_empty() { None } else { Some(parts.join(" + ")) }
}

fn variant_kind(baseline: &PageState, state: &PageState) -> VariantKind {
    if state.theme != baseline.theme {
        return VariantKind::ThemeAlt;
    }

    let layout = state.layout.as_deref().unwrap_or("").to_lowercase();
    if layout.contains("mobile") || layout.contains("compact") {
        VariantKind::Mobile
    } else if layout.contains("desktop") || layout.contains("wide") {
        VariantKind::Desktop
    } else {
        VariantKind::Other
    }
}

fn describe(state: &PageState) -> String {
    format!(
        "theme={} layout={}",
        state.theme.as_deref().unwrap_or("-"),
        state.layout.as_deref().unwrap_or("-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(t: &str) -> PageState {
        PageState {
            theme: Some(t.to_string()),
            layout: None,
        }
    }

    #[test]
    fn default_variant_sorts_first() {
        let mut log = VariantLog::new("https://app.test/", theme("dark"), None);
        log.observe(&theme("light"), "click", None);

        let variants = log.variants();
        assert_eq!(variants[0].kind, VariantKind::Default);
        assert_eq!(variants[0].order, 0.0);
        assert_eq!(variants[1].name, "theme: light");
        assert_eq!(variants[1].kind, VariantKind::ThemeAlt);
        assert!(variants[1].order > variants[0].order);
    }

    #[test]
    fn repeated_observation_is_recorded_once() {
        let mut log = VariantLog::new("https://app.test/", theme("dark"), None);
        assert!(log.observe(&theme("light"), "click", None).is_some());
        assert!(log.observe(&theme("light"), "click", None).is_none());
        assert!(log.observe(&theme("dark"), "click", None).is_none());
        assert_eq!(log.variants().len(), 2);
    }
}
