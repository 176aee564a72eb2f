use crate::output::{print_changes, print_json, print_rules};
use anyhow::Context;
use qprofile_core::{ActiveRuleKey, QualityProfileKey, RuleActivation, RuleKey, Severity};
use std::path::Path;

pub fn activate(
    root: &Path,
    user: Option<&str>,
    profile: QualityProfileKey,
    rule: RuleKey,
    severity: Option<Severity>,
    params: Vec<(String, String)>,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let key = ActiveRuleKey::new(profile, rule);
    let activation = RuleActivation {
        key: key.clone(),
        severity,
        params: params.into_iter().collect(),
    };
    let changes = project
        .service
        .activate(&project.ctx(), &activation)
        .with_context(|| format!("failed to activate {key}"))?;

    if json {
        print_json(&changes)?;
    } else {
        print_changes(&changes);
    }
    Ok(())
}

pub fn deactivate(
    root: &Path,
    user: Option<&str>,
    profile: QualityProfileKey,
    rule: RuleKey,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let key = ActiveRuleKey::new(profile, rule);
    let changes = project
        .service
        .deactivate(&project.ctx(), &key)
        .with_context(|| format!("failed to deactivate {key}"))?;

    if json {
        print_json(&changes)?;
    } else {
        print_changes(&changes);
    }
    Ok(())
}

pub fn show(
    root: &Path,
    user: Option<&str>,
    profile: Option<QualityProfileKey>,
    rule: Option<RuleKey>,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let ctx = project.ctx();
    let rules = match (profile, rule) {
        (_, Some(rule)) => project.service.find_active_rules_by_rule(&ctx, &rule)?,
        (Some(profile), None) => project
            .service
            .find_active_rules_by_profile(&ctx, &profile)?,
        (None, None) => anyhow::bail!("give a profile or --rule"),
    };

    if json {
        print_json(&rules)?;
    } else {
        print_rules(&rules);
    }
    Ok(())
}
