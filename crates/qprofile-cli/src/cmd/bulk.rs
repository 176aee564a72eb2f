use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::{Args, Subcommand};
use qprofile_core::{
    catalog::RuleQuery, BulkActivation, BulkOutcome, BulkReport, QualityProfileKey, Severity,
};
use std::path::Path;

/// Rule selection shared by both bulk subcommands.
#[derive(Args)]
pub struct QueryArgs {
    /// Rule repository (repeatable)
    #[arg(long = "repository")]
    repositories: Vec<String>,
    /// Rule tag (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Full-text query over rule key, name, description and tags
    #[arg(long)]
    text: Option<String>,
}

impl QueryArgs {
    fn into_query(self) -> RuleQuery {
        RuleQuery {
            repositories: self.repositories,
            tags: self.tags,
            text: self.text,
            ..RuleQuery::default()
        }
    }
}

#[derive(Subcommand)]
pub enum BulkSubcommand {
    /// Activate every catalog rule matching the query
    Activate {
        #[arg(value_parser = super::parse_profile)]
        profile: QualityProfileKey,
        #[command(flatten)]
        query: QueryArgs,
        /// Only rules whose default severity is this one (repeatable)
        #[arg(long = "default-severity")]
        default_severities: Vec<Severity>,
        /// Severity to activate with (default: each rule's default)
        #[arg(long)]
        severity: Option<Severity>,
        /// Parameter override as name=value (repeatable)
        #[arg(long = "param", value_parser = super::parse_param)]
        params: Vec<(String, String)>,
    },
    /// Deactivate every active rule matching the query
    Deactivate {
        #[arg(value_parser = super::parse_profile)]
        profile: QualityProfileKey,
        #[command(flatten)]
        query: QueryArgs,
        /// Only rules active with this severity (repeatable)
        #[arg(long = "severity")]
        severities: Vec<Severity>,
    },
}

pub fn run(
    root: &Path,
    user: Option<&str>,
    subcmd: BulkSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let ctx = project.ctx();
    let report = match subcmd {
        BulkSubcommand::Activate {
            profile,
            query,
            default_severities,
            severity,
            params,
        } => {
            let request = BulkActivation {
                query: RuleQuery {
                    severities: default_severities,
                    ..query.into_query()
                },
                profile,
                severity,
                params: params.into_iter().collect(),
            };
            project
                .service
                .bulk_activate(&ctx, &request)
                .with_context(|| format!("bulk activation on '{}' failed", request.profile))?
        }
        BulkSubcommand::Deactivate {
            profile,
            query,
            severities,
        } => {
            let query = RuleQuery {
                severities,
                ..query.into_query()
            };
            project
                .service
                .bulk_deactivate(&ctx, &query, &profile)
                .with_context(|| format!("bulk deactivation on '{profile}' failed"))?
        }
    };

    if json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &BulkReport) {
    if report.outcomes.is_empty() {
        println!("No matching rules.");
        return;
    }
    let rows = report
        .outcomes
        .iter()
        .map(|(rule, outcome)| match outcome {
            BulkOutcome::Succeeded {
                changes,
                index_stale,
            } => vec![
                rule.to_string(),
                if *index_stale { "ok (index stale)" } else { "ok" }.to_string(),
                format!("{} change(s)", changes.len()),
            ],
            BulkOutcome::Failed { kind, reason, .. } => {
                vec![rule.to_string(), format!("failed: {kind}"), reason.clone()]
            }
        })
        .collect();
    print_table(&["RULE", "OUTCOME", "DETAIL"], rows);
    println!(
        "\n{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}
