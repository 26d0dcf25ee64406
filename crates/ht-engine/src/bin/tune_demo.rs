//! Runs two tuning sessions against a synthetic objective, warm-starting the
//! second from the first, and prints the final analysis as JSON.
//!
//! Usage: `ht-tune-demo [strategy] [max_evaluations]`

use anyhow::Context;
use ht_engine::{
    EngineConfig, ReportEvaluationRequest, StartTuningRequest, TransferKnowledgeRequest,
    TuningEngine,
};
use ht_optimizer::{AnalysisType, SearchSpaceDefinition};
use ht_types::{Distribution, ParameterDefinition, ParameterValues};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Peaks at lr = 0.01, depth = 6, optimizer = "adam".
fn objective(values: &ParameterValues) -> f64 {
    let lr = values.get("lr").and_then(|v| v.as_f64()).unwrap_or(1e-4);
    let depth = values.get("depth").and_then(|v| v.as_f64()).unwrap_or(1.0);
    let bonus = match values.get("optimizer").map(|v| v.to_json()) {
        Some(serde_json::Value::String(name)) if name == "adam" => 0.1,
        Some(serde_json::Value::String(name)) if name == "sgd" => 0.05,
        _ => 0.0,
    };
    let lr_term = (lr.log10() + 2.0).powi(2);
    let depth_term = ((depth - 6.0) / 6.0).powi(2);
    1.0 - 0.3 * lr_term - 0.5 * depth_term + bonus
}

fn definition(max_evaluations: usize) -> SearchSpaceDefinition {
    SearchSpaceDefinition::new("synthetic-mlp")
        .with_parameter(
            ParameterDefinition::continuous("lr", 1e-4, 1e-1)
                .with_distribution(Distribution::LogUniform),
        )
        .with_parameter(ParameterDefinition::discrete("depth", 1, 12))
        .with_parameter(ParameterDefinition::categorical(
            "optimizer",
            vec![json!("adam"), json!("sgd"), json!("rmsprop")],
        ))
        .with_max_evaluations(max_evaluations)
}

/// Suggest and report until the session stops issuing candidates.
fn run(engine: &TuningEngine, session_id: &str) -> anyhow::Result<Option<String>> {
    loop {
        let response = engine.suggest_configuration(session_id)?;
        let Some(config) = response.suggestion else {
            return Ok(response.reason);
        };
        let score = objective(&config.values);
        let report = engine.report_evaluation(
            session_id,
            ReportEvaluationRequest::new(config.id, score),
        )?;
        if report.early_stop_recommendation.should_stop {
            info!(
                session = session_id,
                reason = %report.early_stop_recommendation.reason,
                "early stop recommended"
            );
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let strategy = args.next().unwrap_or_else(|| "bayesian".to_string());
    let max_evaluations: usize = match args.next() {
        Some(n) => n.parse().context("max_evaluations must be a positive integer")?,
        None => 40,
    };

    let config = EngineConfig::from_env().context("loading engine configuration")?;
    let engine = TuningEngine::new(config)?;

    let space = engine.define_search_space(definition(max_evaluations))?;
    info!(
        space = %space.space_id,
        complexity = ?space.complexity_estimate.level,
        recommended = ?space.recommended_strategies.first().map(|r| r.strategy),
        "space ready"
    );

    let first = engine.start_tuning(
        StartTuningRequest::new(space.space_id.clone(), strategy.clone()),
    )?;
    for config in &first.initial_suggestions {
        engine.report_evaluation(
            &first.session_id,
            ReportEvaluationRequest::new(config.id.clone(), objective(&config.values)),
        )?;
    }
    let reason = run(&engine, &first.session_id)?;
    info!(session = %first.session_id, reason = ?reason, "first session finished");

    let second = engine.start_tuning(StartTuningRequest::new(space.space_id, strategy))?;
    let transfer = engine.transfer_knowledge(TransferKnowledgeRequest {
        source_session_ids: vec![first.session_id.clone()],
        target_session_id: second.session_id.clone(),
        transfer_strategy: "warm_start".to_string(),
    })?;
    info!(
        seeded = transfer.transfer_result.seeded,
        speedup = transfer.expected_speedup,
        "warm start applied"
    );
    let reason = run(&engine, &second.session_id)?;
    info!(session = %second.session_id, reason = ?reason, "second session finished");

    let analysis = engine.analyze_results(&second.session_id, AnalysisType::Comprehensive)?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
