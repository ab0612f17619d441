//! Public URL and console link construction for tagged revisions.

use shared::protocol::{CONSOLE_RUN_DETAIL, MASK_SERVICE_PLACEHOLDER, MASK_TAG_PLACEHOLDER};
use shared::types::ServiceDescriptor;
use super::neg::NegUrlMaskTable;

/// Result of resolving one tag of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    /// The HTML-escaped base domain, or the URL mask it was derived from
    pub base_url: String,
    /// Anchor markup pointing at the tagged URL
    pub link: String,
}

/// Segments of `projects/{project}/locations/{location}/services/{service}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePath<'a> {
    pub project: &'a str,
    pub location: &'a str,
    pub service: &'a str,
}

impl<'a> ServicePath<'a> {
    pub fn parse(name: &'a str) -> Option<Self> {
        let mut parts = name.split('/');
        match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (
                Some("projects"),
                Some(project),
                Some("locations"),
                Some(location),
                Some("services"),
                Some(service),
                None,
            ) if !project.is_empty() && !location.is_empty() && !service.is_empty() => {
                Some(Self {
                    project,
                    location,
                    service,
                })
            }
            _ => None,
        }
    }
}

/// `<a target="_blank" href="{href}">{text}</a>`, both parts escaped
pub fn anchor(href: &str, text: &str) -> String {
    format!(
        "<a target=\"_blank\" href=\"{}\">{}</a>",
        html_escape::encode_double_quoted_attribute(href),
        html_escape::encode_text(text)
    )
}

/// Link to `url` over https, showing the bare host and path
pub fn https_link(url: &str) -> String {
    anchor(&format!("https://{}", url), url)
}

/// Replaces the first `<tag>` and the first `<service>` in `mask`.
pub fn substitute_mask(mask: &str, tag: &str, service: &str) -> String {
    mask.replacen(MASK_TAG_PLACEHOLDER, tag, 1)
        .replacen(MASK_SERVICE_PLACEHOLDER, service, 1)
}

/// Resolves the public URL of `tag`. The serverless NEG mask wins over the
/// `baseurl` annotation; `None` when neither applies.
///
/// A NEG whose mask is empty is not Cloud Run backed and is skipped.
pub fn resolve_tag_url(
    service: &ServiceDescriptor,
    tag: &str,
    masks: &NegUrlMaskTable,
) -> Option<ResolvedUrl> {
    let mask = service
        .serverless_neg()
        .and_then(|neg| masks.get(neg))
        .filter(|mask| !mask.is_empty());

    if let Some(mask) = mask {
        let url = substitute_mask(mask, tag, service.short_name());
        return Some(ResolvedUrl {
            base_url: html_escape::encode_text(mask).into_owned(),
            link: https_link(&url),
        });
    }

    service.base_url().map(|base_url| ResolvedUrl {
        base_url: html_escape::encode_text(base_url).into_owned(),
        link: https_link(&format!("{}.{}", tag, base_url)),
    })
}

/// Cloud console link to the revisions page of a service
pub fn console_link(path: &ServicePath<'_>) -> String {
    let href = format!(
        "{}/{}/{}/revisions?project={}",
        CONSOLE_RUN_DETAIL, path.location, path.service, path.project
    );
    anchor(&href, path.service)
}
