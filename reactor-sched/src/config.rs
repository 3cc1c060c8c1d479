///
/// Scheduler configuration.
///
/// The idiomatic Rust analogue of the spec's build-time `#define`s
/// (`NUMBER_OF_WORKERS`, `MAX_REACTION_LEVEL`, `FEDERATED`): a plain
/// struct with a builder, constructed once before `Scheduler::new`.
///

use std::num::NonZeroUsize;

use crate::tag::Tag;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub num_workers: NonZeroUsize,
    pub max_level: usize,
    pub federated: bool,
    pub stop_tag: Option<Tag>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: NonZeroUsize::new(1).unwrap(),
            max_level: 0,
            federated: false,
            stop_tag: None,
        }
    }
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn num_workers(mut self, n: usize) -> Self {
        self.config.num_workers = NonZeroUsize::new(n).unwrap_or(NonZeroUsize::new(1).unwrap());
        self
    }

    pub fn max_level(mut self, max_level: usize) -> Self {
        self.config.max_level = max_level;
        self
    }

    pub fn federated(mut self, federated: bool) -> Self {
        self.config.federated = federated;
        self
    }

    pub fn stop_tag(mut self, tag: Tag) -> Self {
        self.config.stop_tag = Some(tag);
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_spec_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.num_workers.get(), 1);
        assert!(!config.federated);
        assert!(config.stop_tag.is_none());
    }

    #[test]
    fn test_builder_sets_all_fields() {
        let config = SchedulerConfig::builder()
            .num_workers(4)
            .max_level(3)
            .federated(true)
            .stop_tag(Tag::new(100, 0))
            .build();

        assert_eq!(config.num_workers.get(), 4);
        assert_eq!(config.max_level, 3);
        assert!(config.federated);
        assert_eq!(config.stop_tag, Some(Tag::new(100, 0)));
    }

    #[test]
    fn test_num_workers_zero_falls_back_to_one() {
        let config = SchedulerConfig::builder().num_workers(0).build();
        assert_eq!(config.num_workers.get(), 1);
    }
}
