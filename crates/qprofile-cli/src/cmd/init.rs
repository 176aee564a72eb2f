use anyhow::Context;
use qprofile_core::{config::EngineConfig, io, paths, store::RedbActivationStore};
use std::path::Path;

pub fn run(root: &Path, admins: &[String]) -> anyhow::Result<()> {
    println!("Initializing quality profiles in: {}", root.display());

    let dir = paths::qprofile_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 1. config.yaml, merging any new admins into an existing one
    let config_path = paths::config_path(root);
    if config_path.exists() {
        let mut cfg = EngineConfig::load(root).context("failed to load config.yaml")?;
        let before = cfg.admins.len();
        for admin in admins {
            if !cfg.is_admin(admin) {
                cfg.admins.push(admin.clone());
            }
        }
        if cfg.admins.len() != before {
            cfg.save(root).context("failed to write config.yaml")?;
            println!("  updated: {}", paths::CONFIG_FILE);
        } else {
            println!("  exists:  {}", paths::CONFIG_FILE);
        }
    } else {
        let cfg = EngineConfig {
            admins: admins.to_vec(),
            ..EngineConfig::default()
        };
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    // 2. catalog and profile files
    for (path, rel, empty) in [
        (paths::catalog_path(root), paths::CATALOG_FILE, "rules: []\n"),
        (paths::profiles_path(root), paths::PROFILES_FILE, "profiles: []\n"),
    ] {
        let written = io::write_if_missing(&path, empty.as_bytes())
            .with_context(|| format!("failed to write {rel}"))?;
        println!("  {} {rel}", if written { "created:" } else { "exists: " });
    }

    // 3. the store, which is local state and stays out of version control
    RedbActivationStore::open(&paths::store_path(root)).context("failed to create the store")?;
    io::ensure_gitignore_entry(root, paths::STORE_FILE).context("failed to update .gitignore")?;

    println!("\nquality profiles initialized.");
    Ok(())
}
