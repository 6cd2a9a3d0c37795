use core::fmt::Write;

use heapless::String;

use crate::config::{MAX_SUFFIX_LEN, MAX_TOPIC_LEN};
use crate::device::DeviceId;
use crate::error::TopicError;

/// Fully namespaced broker topic.
pub type TopicName = String<MAX_TOPIC_LEN>;

/// Per-device topic prefix `/{root}/{device-id}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: TopicName,
}

impl Namespace {
    pub fn new(root: &str, device_id: &DeviceId) -> Result<Self, TopicError> {
        if root.is_empty() || !is_valid_level(root) || root.contains('/') {
            return Err(TopicError::InvalidArgument);
        }
        let mut prefix = String::new();
        write!(prefix, "/{}/{}/", root, device_id.as_str()).map_err(|_| TopicError::NameTooLong)?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Checks that `suffix` can be used as a topic suffix in this namespace.
    pub fn validate(&self, suffix: &str) -> Result<(), TopicError> {
        if suffix.is_empty()
            || suffix.starts_with('/')
            || suffix.ends_with('/')
            || !is_valid_level(suffix)
        {
            return Err(TopicError::InvalidArgument);
        }
        if suffix.len() > MAX_SUFFIX_LEN || self.prefix.len() + suffix.len() > MAX_TOPIC_LEN {
            return Err(TopicError::NameTooLong);
        }
        Ok(())
    }

    /// Builds `/{root}/{device-id}/{suffix}`.
    pub fn topic(&self, suffix: &str) -> Result<TopicName, TopicError> {
        self.validate(suffix)?;
        let mut topic = self.prefix.clone();
        topic
            .push_str(suffix)
            .map_err(|_| TopicError::NameTooLong)?;
        Ok(topic)
    }

    /// Returns the suffix of `topic` if it lies in this namespace.
    pub fn strip<'t>(&self, topic: &'t str) -> Option<&'t str> {
        topic
            .strip_prefix(self.prefix.as_str())
            .filter(|suffix| !suffix.is_empty())
    }
}

/// Wildcards and NUL have no place in a published or subscribed name.
fn is_valid_level(s: &str) -> bool {
    !s.contains(['+', '#', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace() -> Namespace {
        let device = DeviceId::from_mac([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);
        Namespace::new("titanium", &device).unwrap()
    }

    #[test]
    fn builds_device_topics() {
        let ns = namespace();
        assert_eq!(ns.prefix(), "/titanium/A1B2C3D4E5F6/");
        assert_eq!(
            ns.topic("sensor").unwrap().as_str(),
            "/titanium/A1B2C3D4E5F6/sensor"
        );
    }

    #[test]
    fn strips_only_own_namespace() {
        let ns = namespace();
        assert_eq!(ns.strip("/titanium/A1B2C3D4E5F6/config"), Some("config"));
        assert_eq!(ns.strip("/titanium/000000000000/config"), None);
        assert_eq!(ns.strip("/titanium/A1B2C3D4E5F6/"), None);
    }

    #[test]
    fn rejects_wildcards_and_long_suffixes() {
        let ns = namespace();
        assert_eq!(ns.topic("a/+"), Err(TopicError::InvalidArgument));
        assert_eq!(ns.topic(""), Err(TopicError::InvalidArgument));
        let long = "x".repeat(MAX_SUFFIX_LEN + 1);
        assert_eq!(ns.topic(&long), Err(TopicError::NameTooLong));
    }
}
