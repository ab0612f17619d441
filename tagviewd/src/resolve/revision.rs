use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use shared::types::{RevisionMetadata, Row, ServiceDescriptor, TrafficTagBinding};
use crate::cloud::CloudRun;
use crate::error::ResolveError;
use super::neg::NegUrlMaskTable;
use super::url::{console_link, resolve_tag_url, ServicePath};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time zone used to display revision creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Named(Tz),
    /// No usable zone configured; times are shown in the process local zone
    Local,
}

impl DisplayZone {
    /// Parses an IANA zone name. Missing or unknown names fall back to `Local`.
    pub fn from_config(name: Option<&str>) -> Self {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Self::Local;
        };

        match name.parse::<Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(e) => {
                tracing::warn!(timezone = %name, error = %e, "Error loading location, using local time");
                Self::Local
            }
        }
    }

    pub fn format(&self, instant: DateTime<Utc>) -> String {
        match self {
            Self::Named(tz) => instant.with_timezone(tz).format(DATE_FORMAT).to_string(),
            Self::Local => instant.with_timezone(&Local).format(DATE_FORMAT).to_string(),
        }
    }
}

/// Builds the display row for a fetched revision.
pub fn build_row(
    service: &ServiceDescriptor,
    binding: &TrafficTagBinding,
    revision: &RevisionMetadata,
    identifying_label: &str,
    masks: &NegUrlMaskTable,
    zone: DisplayZone,
) -> Result<Row, ResolveError> {
    let date = zone.format(revision.created_at);

    let resolved = resolve_tag_url(service, &binding.tag, masks).ok_or_else(|| {
        ResolveError::NoAddressing {
            service: service.name.clone(),
            revision: binding.revision_name.clone(),
        }
    })?;

    let path = ServicePath::parse(&service.name)
        .ok_or_else(|| ResolveError::MalformedServiceName(service.name.clone()))?;

    Ok(Row {
        date,
        url: resolved.link,
        identifying_label: format!("{}={}", identifying_label, service.label(identifying_label)),
        service: console_link(&path),
        base_url: resolved.base_url,
        revision_tag: binding.tag.clone(),
    })
}

/// Fetches the revision behind `binding` and turns it into a row.
pub async fn resolve_binding(
    run: &dyn CloudRun,
    service: &ServiceDescriptor,
    binding: &TrafficTagBinding,
    identifying_label: &str,
    masks: &NegUrlMaskTable,
    zone: DisplayZone,
) -> Result<Row, ResolveError> {
    let revision = run
        .get_revision(&service.name, &binding.revision_name)
        .await
        .map_err(|source| ResolveError::Revision {
            revision: binding.revision_name.clone(),
            source,
        })?;

    build_row(service, binding, &revision, identifying_label, masks, zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_service() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "projects/p/locations/us-central1/services/svc1".to_string(),
            annotations: [("baseurl".to_string(), "example.com".to_string())].into(),
            labels: [("team".to_string(), "core".to_string())].into(),
            traffic: Vec::new(),
        }
    }

    fn test_binding(tag: &str) -> TrafficTagBinding {
        TrafficTagBinding {
            revision_name: format!("svc1-{tag}"),
            tag: tag.to_string(),
        }
    }

    fn test_revision() -> RevisionMetadata {
        RevisionMetadata {
            revision_name: "svc1-v2".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
        }
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!(DisplayZone::from_config(None), DisplayZone::Local);
        assert_eq!(DisplayZone::from_config(Some("")), DisplayZone::Local);
        assert_eq!(DisplayZone::from_config(Some("Not/AZone")), DisplayZone::Local);
        assert_eq!(
            DisplayZone::from_config(Some("Europe/Paris")),
            DisplayZone::Named(chrono_tz::Europe::Paris)
        );
    }

    #[test]
    fn test_named_zone_formatting() {
        let instant = test_revision().created_at;
        assert_eq!(
            DisplayZone::Named(chrono_tz::Europe::Paris).format(instant),
            "2024-03-05 15:07:09"
        );
        assert_eq!(DisplayZone::Named(chrono_tz::UTC).format(instant), "2024-03-05 14:07:09");
    }

    #[test]
    fn test_local_fallback_formats_unconverted_instant() {
        let instant = test_revision().created_at;
        let expected = instant.with_timezone(&Local).format(DATE_FORMAT).to_string();
        assert_eq!(DisplayZone::Local.format(instant), expected);
    }

    #[test]
    fn test_build_row() {
        let row = build_row(
            &test_service(),
            &test_binding("v2"),
            &test_revision(),
            "team",
            &NegUrlMaskTable::default(),
            DisplayZone::Named(chrono_tz::UTC),
        )
        .unwrap();

        assert_eq!(row.date, "2024-03-05 14:07:09");
        assert_eq!(row.url, r#"<a target="_blank" href="https://v2.example.com">v2.example.com</a>"#);
        assert_eq!(row.identifying_label, "team=core");
        assert!(row.service.contains("/run/detail/us-central1/svc1/revisions?project=p"));
        assert_eq!(row.base_url, "example.com");
        assert_eq!(row.revision_tag, "v2");
    }

    #[test]
    fn test_missing_label_has_empty_value() {
        let row = build_row(
            &test_service(),
            &test_binding("v2"),
            &test_revision(),
            "owner",
            &NegUrlMaskTable::default(),
            DisplayZone::Local,
        )
        .unwrap();

        assert_eq!(row.identifying_label, "owner=");
    }

    #[test]
    fn test_build_row_is_deterministic() {
        let masks = NegUrlMaskTable::from_iter([("grp1", "<tag>---<service>.a.run.app")]);
        let mut service = test_service();
        service
            .annotations
            .insert("serverless-neg".to_string(), "grp1".to_string());

        let build = || {
            build_row(
                &service,
                &test_binding("v3"),
                &test_revision(),
                "team",
                &masks,
                DisplayZone::Named(chrono_tz::Asia::Tokyo),
            )
            .unwrap()
        };

        assert_eq!(build(), build());
    }

    #[test]
    fn test_no_addressing_names_revision() {
        let mut service = test_service();
        service.annotations.clear();

        let err = build_row(
            &service,
            &test_binding("v2"),
            &test_revision(),
            "team",
            &NegUrlMaskTable::default(),
            DisplayZone::Local,
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::NoAddressing { .. }));
        assert!(err.to_string().contains("svc1-v2"));
    }

    #[test]
    fn test_malformed_service_name_is_dropped() {
        let mut service = test_service();
        service.name = "svc1".to_string();

        let err = build_row(
            &service,
            &test_binding("v2"),
            &test_revision(),
            "team",
            &NegUrlMaskTable::default(),
            DisplayZone::Local,
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::MalformedServiceName(_)));
    }
}
