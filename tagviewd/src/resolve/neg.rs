use std::collections::HashMap;
use futures::TryStreamExt;
use crate::cloud::EndpointGroups;
use crate::error::MaskTableError;

/// Serverless NEG name to Cloud Run URL mask. Groups that are not backed by
/// Cloud Run are present with an empty mask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegUrlMaskTable {
    masks: HashMap<String, String>,
}

impl NegUrlMaskTable {
    pub fn get(&self, neg_name: &str) -> Option<&str> {
        self.masks.get(neg_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NegUrlMaskTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            masks: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Reads every regional NEG in `project`/`region` into a mask table.
/// On failure the entries read so far travel with the error.
pub async fn build_mask_table(
    source: &dyn EndpointGroups,
    project: &str,
    region: &str,
) -> Result<NegUrlMaskTable, MaskTableError> {
    let mut table = NegUrlMaskTable::default();
    let mut groups = source.list_network_endpoint_groups(project, region);

    loop {
        match groups.try_next().await {
            Ok(Some(group)) => {
                table
                    .masks
                    .insert(group.name, group.url_mask.unwrap_or_default());
            }
            Ok(None) => break,
            Err(e) => {
                return Err(MaskTableError {
                    partial: table,
                    source: e,
                });
            }
        }
    }

    tracing::debug!(negs = table.len(), "Built serverless NEG url mask table");
    Ok(table)
}
