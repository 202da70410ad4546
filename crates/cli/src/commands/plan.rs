//! plan command - Show the access plan per provider
//!
//! Runs access resolution, including the direct-access probe, without
//! transferring anything.

use clap::Args;
use ef_core::PartitionPlan;

use super::{fail, load_config, SourceArgs};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show which access method each provider would use
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

/// One table row per partition
fn plan_rows(plans: &[PartitionPlan]) -> Vec<Vec<String>> {
    plans
        .iter()
        .map(|p| {
            let (method, scope) = match &p.plan {
                Some(plan) => (
                    plan.method.to_string(),
                    plan.scope.as_ref().map(ToString::to_string).unwrap_or_default(),
                ),
                None => ("-".to_string(), String::new()),
            };
            vec![
                p.provider.clone().unwrap_or_else(|| "(none)".to_string()),
                p.objects.to_string(),
                method,
                scope,
                p.error.clone().unwrap_or_default(),
            ]
        })
        .collect()
}

/// Execute the plan command
pub async fn execute(args: PlanArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let sources = match args.source.sources() {
        Ok(sources) => sources,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };
    let config = match load_config(&formatter) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let access = match ef_s3::login(&config) {
        Ok(access) => access,
        Err(e) => return fail(&formatter, &e),
    };

    let plans = match access.plan(sources).await {
        Ok(plans) => plans,
        Err(e) => return fail(&formatter, &e),
    };
    let failed = plans.iter().any(|p| p.error.is_some());

    if formatter.is_json() {
        formatter.json(&plans);
    } else {
        let table = formatter.table(
            &["PROVIDER", "OBJECTS", "METHOD", "SCOPE", "ERROR"],
            plan_rows(&plans),
        );
        formatter.println(&table.to_string());
    }

    if failed {
        ExitCode::PartialFailure
    } else {
        ExitCode::Success
    }
}
