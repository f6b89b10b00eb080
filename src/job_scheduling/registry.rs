//! Immutable catalog of job descriptors

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::warn;

use crate::errors::ConfigError;
use crate::models::{JobDescriptor, ScheduleKind};

/// Validated, immutable set of job descriptors in declaration order
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    descriptors: Vec<JobDescriptor>,
    index: HashMap<String, usize>,
}

impl JobRegistry {
    /// Validate and index descriptors
    ///
    /// Rejects empty or duplicate names, `postExecute`/`conflicts` entries
    /// naming unknown jobs, self-conflicts, zero intervals, a `delay` longer
    /// than the `interval`, and `postExecute` cycles.
    pub fn new(descriptors: Vec<JobDescriptor>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            if descriptor.name.trim().is_empty() {
                return Err(ConfigError::invalid_registry("job name must not be empty"));
            }
            if index.insert(descriptor.name.clone(), position).is_some() {
                return Err(ConfigError::invalid_registry(format!(
                    "duplicate job name '{}'",
                    descriptor.name
                )));
            }
        }

        for descriptor in &descriptors {
            Self::validate_descriptor(descriptor, &index)?;
        }

        let registry = Self { descriptors, index };
        registry.reject_chain_cycles()?;
        Ok(registry)
    }

    fn validate_descriptor(
        descriptor: &JobDescriptor,
        index: &HashMap<String, usize>,
    ) -> Result<(), ConfigError> {
        let name = &descriptor.name;

        if descriptor.interval == Some(Duration::ZERO) {
            return Err(ConfigError::invalid_registry(format!(
                "job '{name}' has a zero interval"
            )));
        }
        if let (Some(interval), Some(delay)) = (descriptor.interval, descriptor.delay) {
            if delay > interval {
                return Err(ConfigError::invalid_registry(format!(
                    "job '{name}' has delay {delay:?} longer than its interval {interval:?}"
                )));
            }
        }
        if descriptor.delay.is_some() && !descriptor.run_on_startup {
            warn!(
                job = %name,
                "delay only applies to the startup run; ignored because runOnStartup is not set"
            );
        }

        for step in &descriptor.post_execute {
            if !index.contains_key(step) {
                return Err(ConfigError::invalid_registry(format!(
                    "job '{name}' chains to unknown job '{step}'"
                )));
            }
        }
        for other in &descriptor.conflicts {
            if other == name {
                return Err(ConfigError::invalid_registry(format!(
                    "job '{name}' lists itself as a conflict"
                )));
            }
            if !index.contains_key(other) {
                return Err(ConfigError::invalid_registry(format!(
                    "job '{name}' conflicts with unknown job '{other}'"
                )));
            }
        }
        Ok(())
    }

    fn reject_chain_cycles(&self) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit<'a>(
            registry: &'a JobRegistry,
            name: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<(), ConfigError> {
            match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    let start = path.iter().position(|n| *n == name).unwrap_or(0);
                    let mut cycle: Vec<&str> = path[start..].to_vec();
                    cycle.push(name);
                    return Err(ConfigError::invalid_registry(format!(
                        "postExecute cycle: {}",
                        cycle.join(" -> ")
                    )));
                }
                Mark::Unvisited => {}
            }

            marks.insert(name, Mark::InProgress);
            path.push(name);
            if let Some(descriptor) = registry.get(name) {
                for step in &descriptor.post_execute {
                    visit(registry, step, marks, path)?;
                }
            }
            path.pop();
            marks.insert(name, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for descriptor in &self.descriptors {
            visit(self, &descriptor.name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JobDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors with a given scheduling shape
    pub fn of_kind(&self, kind: ScheduleKind) -> impl Iterator<Item = &JobDescriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.schedule_kind() == kind)
    }

    /// Conflict sets made symmetric: if `a` lists `b`, `b` also blocks on `a`
    pub fn conflict_map(&self) -> HashMap<String, HashSet<String>> {
        let mut map: HashMap<String, HashSet<String>> = self
            .descriptors
            .iter()
            .map(|d| (d.name.clone(), HashSet::new()))
            .collect();
        for descriptor in &self.descriptors {
            for other in &descriptor.conflicts {
                map.entry(descriptor.name.clone())
                    .or_default()
                    .insert(other.clone());
                map.entry(other.clone())
                    .or_default()
                    .insert(descriptor.name.clone());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_valid_registry_keeps_declaration_order() {
        let registry = JobRegistry::new(vec![
            JobDescriptor::new("catalog_sync")
                .with_interval(secs(3600))
                .on_startup()
                .with_post_execute(["details_refresh", "title_cleanup"]),
            JobDescriptor::new("details_refresh"),
            JobDescriptor::new("title_cleanup").with_conflicts(["catalog_sync"]),
        ])
        .unwrap();

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["catalog_sync", "details_refresh", "title_cleanup"]
        );
        assert_eq!(registry.of_kind(ScheduleKind::StartupThenInterval).count(), 1);
        assert_eq!(registry.of_kind(ScheduleKind::Manual).count(), 2);
    }

    #[test]
    fn test_conflicts_are_symmetric() {
        let registry = JobRegistry::new(vec![
            JobDescriptor::new("a").with_conflicts(["b"]),
            JobDescriptor::new("b"),
        ])
        .unwrap();
        let conflicts = registry.conflict_map();
        assert!(conflicts["a"].contains("b"));
        assert!(conflicts["b"].contains("a"));
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_references() {
        let duplicate = JobRegistry::new(vec![JobDescriptor::new("a"), JobDescriptor::new("a")]);
        assert!(matches!(duplicate, Err(ConfigError::InvalidRegistry { .. })));

        let unknown_chain = JobRegistry::new(vec![JobDescriptor::new("a").with_post_execute(["ghost"])]);
        assert!(unknown_chain.is_err());

        let unknown_conflict = JobRegistry::new(vec![JobDescriptor::new("a").with_conflicts(["ghost"])]);
        assert!(unknown_conflict.is_err());

        let self_conflict = JobRegistry::new(vec![JobDescriptor::new("a").with_conflicts(["a"])]);
        assert!(self_conflict.is_err());
    }

    #[test]
    fn test_rejects_bad_timings() {
        let zero = JobRegistry::new(vec![JobDescriptor::new("a").with_interval(Duration::ZERO)]);
        assert!(zero.is_err());

        let long_delay = JobRegistry::new(vec![JobDescriptor::new("a")
            .with_interval(secs(5))
            .on_startup()
            .with_delay(secs(10))]);
        assert!(long_delay.is_err());

        let equal_delay = JobRegistry::new(vec![JobDescriptor::new("a")
            .with_interval(secs(5))
            .on_startup()
            .with_delay(secs(5))]);
        assert!(equal_delay.is_ok());
    }

    #[test]
    fn test_rejects_chain_cycles() {
        let result = JobRegistry::new(vec![
            JobDescriptor::new("a").with_post_execute(["b"]),
            JobDescriptor::new("b").with_post_execute(["c"]),
            JobDescriptor::new("c").with_post_execute(["a"]),
        ]);
        match result {
            Err(ConfigError::InvalidRegistry { message }) => {
                assert!(message.contains("a -> b -> c -> a"), "{message}");
            }
            other => panic!("expected a cycle error, got {other:?}"),
        }

        let diamond = JobRegistry::new(vec![
            JobDescriptor::new("a").with_post_execute(["b", "c"]),
            JobDescriptor::new("b").with_post_execute(["d"]),
            JobDescriptor::new("c").with_post_execute(["d"]),
            JobDescriptor::new("d"),
        ]);
        assert!(diamond.is_ok());
    }
}
