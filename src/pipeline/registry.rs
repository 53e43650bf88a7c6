//! Name-to-constructor registry for collaborators
//!
//! The registry is an ordinary value owned by the caller. Nothing is
//! registered globally; tests build their own registry with stub
//! collaborators.

use crate::config::Config;
use crate::pipeline::analyzer::PassthroughAnalyzer;
use crate::pipeline::collaborators::{Analyzer, Collector, Processor};
use crate::pipeline::fetcher::HttpCollector;
use crate::pipeline::parser::HtmlProcessor;
use crate::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::Arc;

type Factory<T> = Box<dyn Fn(&Config) -> Result<Arc<T>> + Send + Sync>;

/// The resolved collaborators of one pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub collector: Arc<dyn Collector>,
    pub processor: Arc<dyn Processor>,
    pub analyzer: Arc<dyn Analyzer>,
}

/// Maps collaborator names to constructors
#[derive(Default)]
pub struct CollaboratorRegistry {
    collectors: HashMap<String, Factory<dyn Collector>>,
    processors: HashMap<String, Factory<dyn Processor>>,
    analyzers: HashMap<String, Factory<dyn Analyzer>>,
}

impl CollaboratorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in collaborators
    ///
    /// | Kind | Name | Implementation |
    /// |------|------|----------------|
    /// | collector | `http` | [`HttpCollector`] |
    /// | processor | `html` | [`HtmlProcessor`] |
    /// | analyzer | `passthrough` | [`PassthroughAnalyzer`] |
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_collector("http", |config| {
            Ok(Arc::new(HttpCollector::new(config)?) as Arc<dyn Collector>)
        });
        registry.register_processor("html", |_| Ok(Arc::new(HtmlProcessor) as Arc<dyn Processor>));
        registry.register_analyzer("passthrough", |_| {
            Ok(Arc::new(PassthroughAnalyzer) as Arc<dyn Analyzer>)
        });
        registry
    }

    /// Registers a collector constructor, replacing any previous one of that name
    pub fn register_collector<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn Collector>> + Send + Sync + 'static,
    {
        self.collectors.insert(name.into(), Box::new(factory));
    }

    pub fn register_processor<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn Processor>> + Send + Sync + 'static,
    {
        self.processors.insert(name.into(), Box::new(factory));
    }

    pub fn register_analyzer<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn Analyzer>> + Send + Sync + 'static,
    {
        self.analyzers.insert(name.into(), Box::new(factory));
    }

    /// Registers an existing collector instance under `name`
    pub fn add_collector(&mut self, name: impl Into<String>, collector: Arc<dyn Collector>) {
        self.register_collector(name, move |_| Ok(Arc::clone(&collector)));
    }

    pub fn add_processor(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.register_processor(name, move |_| Ok(Arc::clone(&processor)));
    }

    pub fn add_analyzer(&mut self, name: impl Into<String>, analyzer: Arc<dyn Analyzer>) {
        self.register_analyzer(name, move |_| Ok(Arc::clone(&analyzer)));
    }

    /// Constructs the collaborators named in `config.collectors`
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnknownCollaborator` for an unregistered name,
    /// or whatever error the constructor itself reports.
    pub fn build(&self, config: &Config) -> Result<Collaborators> {
        let names = &config.collectors;
        Ok(Collaborators {
            collector: resolve(&self.collectors, "collector", &names.collector, config)?,
            processor: resolve(&self.processors, "processor", &names.processor, config)?,
            analyzer: resolve(&self.analyzers, "analyzer", &names.analyzer, config)?,
        })
    }
}

fn resolve<T: ?Sized>(
    factories: &HashMap<String, Factory<T>>,
    kind: &'static str,
    name: &str,
    config: &Config,
) -> Result<Arc<T>> {
    let factory = factories
        .get(name)
        .ok_or_else(|| PipelineError::UnknownCollaborator {
            kind,
            name: name.to_string(),
        })?;

    tracing::debug!("Using {} collaborator '{}'", kind, name);
    factory(config)
}
