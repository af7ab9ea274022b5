use uuid::Uuid;

use crate::{
    config::UrlConfig,
    models::{storage_key, Artifact, ArtifactRecord, MediaKind},
};

/// Derives public and thumbnail locations from an artifact id. Nothing
/// here touches storage; URLs are never persisted.
#[derive(Debug, Clone)]
pub struct UrlDeriver {
    public_base: String,
    thumbnail_base: String,
    thumbnail_width: u32,
}

impl UrlDeriver {
    pub fn new(config: &UrlConfig) -> Self {
        Self {
            public_base: config.public_base.trim_end_matches('/').to_string(),
            thumbnail_base: config.thumbnail_base.trim_end_matches('/').to_string(),
            thumbnail_width: config.thumbnail_width,
        }
    }

    pub fn public_url(&self, kind: MediaKind, id: Uuid) -> String {
        format!("{}/{}", self.public_base, storage_key(kind, id))
    }

    pub fn thumbnail_url(&self, kind: MediaKind, id: Uuid) -> String {
        format!(
            "{}/{}?width={}",
            self.thumbnail_base,
            storage_key(kind, id),
            self.thumbnail_width
        )
    }

    pub fn artifact(&self, record: ArtifactRecord) -> Artifact {
        Artifact {
            url: self.public_url(record.kind, record.id),
            thumbnail_url: self.thumbnail_url(record.kind, record.id),
            record,
        }
    }
}

impl Default for UrlDeriver {
    fn default() -> Self {
        Self::new(&UrlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_key_layout() {
        let deriver = UrlDeriver::new(
            &UrlConfig::new().with_bases("https://cdn.example.com/", "https://img.example.com"),
        );
        let id = Uuid::new_v4();

        assert_eq!(
            deriver.public_url(MediaKind::Video, id),
            format!("https://cdn.example.com/videos/{}", id)
        );
        assert_eq!(
            deriver.thumbnail_url(MediaKind::Image, id),
            format!("https://img.example.com/images/{}?width=256", id)
        );
    }

    #[test]
    fn distinct_ids_give_distinct_urls() {
        let deriver = UrlDeriver::default();
        let a = deriver.public_url(MediaKind::Image, Uuid::new_v4());
        let b = deriver.public_url(MediaKind::Image, Uuid::new_v4());
        assert_ne!(a, b);
    }
}
