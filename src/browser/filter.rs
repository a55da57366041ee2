use crate::browser::{RequestDescriptor, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Allow,
    Block,
}

/// Sub-resource policy: images and map tiles always load, fonts and
/// streaming media never do, the rest is left alone.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    allowed_domains: Vec<String>,
}

impl RequestFilter {
    pub fn new(allowed_domains: &[String]) -> Self {
        Self {
            allowed_domains: allowed_domains
                .iter()
                .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, request: &RequestDescriptor) -> FilterDecision {
        if request.kind == ResourceKind::Image || self.is_allowed_domain(&request.url) {
            return FilterDecision::Allow;
        }
        match request.kind {
            ResourceKind::Font
            | ResourceKind::Media
            | ResourceKind::TextTrack
            | ResourceKind::WebSocket
            | ResourceKind::EventSource => FilterDecision::Block,
            _ => FilterDecision::Allow,
        }
    }

    fn is_allowed_domain(&self, url: &str) -> bool {
        let host = match url::Url::parse(url) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return false,
            },
            Err(_) => return false,
        };
        self.allowed_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RequestFilter {
        RequestFilter::new(&["maps.googleapis.com".to_string(), ".openstreetmap.org".to_string()])
    }

    #[test]
    fn test_images_always_allowed() {
        let req = RequestDescriptor::new(ResourceKind::Image, "https://cdn.example.com/a.png");
        assert_eq!(filter().classify(&req), FilterDecision::Allow);
    }

    #[test]
    fn test_heavy_resources_blocked() {
        for kind in [
            ResourceKind::Font,
            ResourceKind::Media,
            ResourceKind::TextTrack,
            ResourceKind::WebSocket,
            ResourceKind::EventSource,
        ] {
            let req = RequestDescriptor::new(kind, "https://cdn.example.com/resource");
            assert_eq!(filter().classify(&req), FilterDecision::Block, "{:?}", kind);
        }
    }

    #[test]
    fn test_everything_else_allowed() {
        for kind in [
            ResourceKind::Document,
            ResourceKind::Stylesheet,
            ResourceKind::Script,
            ResourceKind::Xhr,
            ResourceKind::Fetch,
            ResourceKind::Other,
        ] {
            let req = RequestDescriptor::new(kind, "https://example.com/x");
            assert_eq!(filter().classify(&req), FilterDecision::Allow, "{:?}", kind);
        }
    }

    #[test]
    fn test_map_domains_bypass_blocklist() {
        let font = RequestDescriptor::new(
            ResourceKind::Font,
            "https://maps.googleapis.com/maps/vt/font.woff2",
        );
        assert_eq!(filter().classify(&font), FilterDecision::Allow);

        let tile = RequestDescriptor::new(ResourceKind::Media, "https://a.tile.openstreetmap.org/1/2/3");
        assert_eq!(filter().classify(&tile), FilterDecision::Allow);
    }

    #[test]
    fn test_domain_match_is_not_substring() {
        let req = RequestDescriptor::new(
            ResourceKind::Font,
            "https://evilmaps.googleapis.com.example.net/font.woff",
        );
        assert_eq!(filter().classify(&req), FilterDecision::Block);

        let req = RequestDescriptor::new(ResourceKind::Font, "https://notmaps.googleapis.com/f.woff");
        assert_eq!(filter().classify(&req), FilterDecision::Block);
    }

    #[test]
    fn test_unparseable_url_uses_kind_only() {
        let req = RequestDescriptor::new(ResourceKind::Font, "data:font/woff2;base64,AAAA");
        assert_eq!(filter().classify(&req), FilterDecision::Block);
        let req = RequestDescriptor::new(ResourceKind::Script, "::::");
        assert_eq!(filter().classify(&req), FilterDecision::Allow);
    }
}
