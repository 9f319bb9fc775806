//! Binary entrypoint for the chainval API server.
use anyhow::Context;
use chainval_api::run;
use chainval_core::ValidatorConfig;
use chainval_registry::TypeRegistry;
use chainval_rules::RuleSet;
use chainval_validate::{TracingReporter, Validator};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("CHAINVAL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("CHAINVAL_CONFIG") {
        Ok(path) => ValidatorConfig::load(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => ValidatorConfig::default(),
    };

    // A custom catalog replaces the built-in one, and its rules come with it
    let (registry, rules) = match std::env::var("CHAINVAL_CATALOG") {
        Ok(path) => {
            let registry =
                TypeRegistry::load(&path).with_context(|| format!("loading {}", path))?;
            let rules = match std::env::var("CHAINVAL_RULES") {
                Ok(rules) => RuleSet::load(&rules, &registry)
                    .with_context(|| format!("loading {}", rules))?,
                Err(_) => RuleSet::default(),
            };
            (registry, rules)
        }
        Err(_) => (
            chainval_registry::builtin_registry().clone(),
            chainval_rules::builtin_rule_set().clone(),
        ),
    };
    tracing::info!(types = registry.len(), rules = rules.len(), "rules compiled");

    let reporter = Arc::new(TracingReporter::new(config.abort_at));
    let validator =
        Validator::new(Arc::new(registry), Arc::new(rules), config)?.with_reporter(reporter);

    // Default listen address can be overridden with CHAINVAL_ADDR
    let addr = std::env::var("CHAINVAL_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    run(&addr, validator).await
}
