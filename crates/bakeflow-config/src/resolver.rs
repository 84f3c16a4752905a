//! Document resolution: render, parse, validate, merge
//!
//! The cross product of platforms and profiles becomes a map keyed by
//! `"{platform}-{profile}"`. Two document styles are accepted: the legacy
//! flat style where the platform body is itself the build stage, and the
//! nested style with explicit `build:` / `test:` sub-stages. Both resolve
//! to the same [`BuildSpec`] shape.

use crate::error::{ConfigError, Result};
use crate::model::InstanceSpec;
use crate::raw::{RawDocument, RawStage};
use crate::template;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Resolved configuration, keyed by instance
pub type Config = BTreeMap<String, InstanceSpec>;

const DOCUMENT_CANDIDATES: [&str; 2] = ["bake.yml", ".bake.yml"];

/// Locate the configuration document in the current directory
pub fn find_document() -> Result<std::path::PathBuf> {
    for candidate in DOCUMENT_CANDIDATES {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }
    Err(ConfigError::NotFound {
        path: std::path::PathBuf::from(DOCUMENT_CANDIDATES[0]),
    })
}

/// Load, render and resolve a document from disk
pub fn load(path: &Path) -> Result<Config> {
    let rendered = template::render_file(path)?;
    let doc: RawDocument = serde_yaml::from_str(&rendered)
        .map_err(|e| ConfigError::validation(e.to_string()))?;
    resolve_document(doc)
}

/// Resolve an already parsed document
pub fn resolve_document(doc: RawDocument) -> Result<Config> {
    let mut errors = Vec::new();

    let defaults = match (doc.defaults, doc.driver) {
        (Some(defaults), _) => defaults,
        (None, Some(driver)) => {
            tracing::warn!("`driver` is deprecated, please use `defaults` instead");
            driver
        }
        (None, None) => RawStage::default(),
    };

    if doc.platforms.is_empty() {
        errors.push("at least one platform is required".to_string());
    }
    check_unique("platform", doc.platforms.iter().map(|p| p.name.as_str()), &mut errors);
    check_unique("profile", doc.profiles.iter().map(|p| p.name.as_str()), &mut errors);

    let mut config = Config::new();
    for platform in &doc.platforms {
        // Legacy flat documents carry the build stage in the platform body.
        let base = defaults.overlaid(&platform.overrides);
        let build_raw = match &platform.build {
            Some(stage) => base.overlaid(stage),
            None => base.clone(),
        };
        let test_raw = match &platform.test {
            Some(stage) => build_raw.overlaid(stage),
            None => build_raw.clone(),
        };

        for profile in &doc.profiles {
            let key = format!("{}-{}", platform.name, profile.name);
            let build =
                build_raw
                    .clone()
                    .finalize(&platform.name, &profile.name, &profile.extra_vars);
            let test =
                test_raw
                    .clone()
                    .finalize(&platform.name, &profile.name, &profile.extra_vars);
            match (build, test) {
                (Ok(build), Ok(test)) => {
                    config.insert(
                        key,
                        InstanceSpec {
                            platform: platform.name.clone(),
                            profile: profile.name.clone(),
                            build,
                            test,
                        },
                    );
                }
                (build, test) => {
                    if let Err(mut e) = build {
                        errors.append(&mut e);
                    }
                    if let Err(mut e) = test {
                        errors.append(&mut e);
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        errors.sort();
        errors.dedup();
        Err(ConfigError::Validation(errors))
    }
}

fn check_unique<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Vec<String>,
) {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            errors.push(format!("duplicate {kind} name: {name}"));
        }
    }
}
