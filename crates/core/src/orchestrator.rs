//! Top-level denormalisation driver.
//!
//! Stages run strictly in order:
//!
//! resolve connection → validate policy → comments log → attach →
//! transform → save → drop
//!
//! Nothing before attach needs cleanup. From attach onwards the working
//! database is held by a [`WorkingDatabase`] handle, so it is dropped on
//! every path out of [`Orchestrator::run`].

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::command::CommandRunner;
use crate::config::{sidecar_path, ResolvedTarget, RunConfig};
use crate::discovery::InstanceResolver;
use crate::error::{ConfigError, DenormaliseError, RunFailure};
use crate::lifecycle::{
    DatabaseAdmin, EphemeralDatabase, EphemeralDatabaseLifecycle, WorkingDatabase,
};
use crate::policy::MergePolicy;
use crate::sidecar::{self, OptionValue};
use crate::transform::{DatabaseLocator, SourceLocator, TransformRequest, Transformer};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub database: String,
    pub target: ResolvedTarget,
}

pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    admin: &'a dyn DatabaseAdmin,
    transformer: &'a dyn Transformer,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        admin: &'a dyn DatabaseAdmin,
        transformer: &'a dyn Transformer,
    ) -> Self {
        Self {
            runner,
            admin,
            transformer,
        }
    }

    pub fn run(&self, config: &RunConfig) -> Result<RunSummary, RunFailure> {
        let target = InstanceResolver::new(self.runner, config.capability)
            .resolve(&config.target, config.product_version)?;

        let policy = MergePolicy::build(config.choices.iter().map(|(c, a)| (c, a)))
            .map_err(DenormaliseError::from)?;

        let output = config.output_path();
        let template = config.template_path();
        if !template.is_file() {
            return Err(DenormaliseError::from(ConfigError::MissingTemplate(template)).into());
        }

        if config.write_comments {
            write_comments(config, &target, &policy, &output)?;
        }

        let lifecycle = EphemeralDatabaseLifecycle::new(self.admin, &target);
        let database = EphemeralDatabase::new(&template);
        let mut working = lifecycle
            .attach(database)
            .map_err(DenormaliseError::from)?;
        let name = working.name().to_string();

        let outcome = self.transform_and_save(config, &target, &policy, &output, &mut working);
        let teardown = working.release();

        match (outcome, teardown) {
            (Ok(()), Ok(())) => {
                info!(output = %output.display(), database = %name, "Denormalisation complete");
                Ok(RunSummary {
                    output,
                    database: name,
                    target,
                })
            }
            (Ok(()), Err(drop_err)) => Err(DenormaliseError::from(drop_err).into()),
            (Err(err), Ok(())) => Err(err.into()),
            (Err(err), Err(drop_err)) => {
                error!(error = %drop_err, "Working database cleanup failed after an earlier error");
                Err(RunFailure::with_suppressed(err, drop_err))
            }
        }
    }

    fn transform_and_save(
        &self,
        config: &RunConfig,
        target: &ResolvedTarget,
        policy: &MergePolicy,
        output: &Path,
        working: &mut WorkingDatabase<'_>,
    ) -> Result<(), DenormaliseError> {
        let request = TransformRequest {
            input: SourceLocator::new(&config.input),
            output: DatabaseLocator::new(target, working.name(), &config.credentials),
            policy: policy.clone(),
        };
        self.transformer.transform(&request)?;
        working.save(output)?;
        Ok(())
    }
}

/// Record the effective options in the comments log beside `output`.
fn write_comments(
    config: &RunConfig,
    target: &ResolvedTarget,
    policy: &MergePolicy,
    output: &Path,
) -> Result<(), DenormaliseError> {
    let text = |value: &str| OptionValue::Text(value.to_string());

    let mut options = vec![(
        "nvivoversion".to_string(),
        text(config.product_version.as_str()),
    )];
    if let Some(host) = &target.host {
        options.push(("server".to_string(), text(host)));
    }
    options.push(("port".to_string(), OptionValue::Number(i64::from(target.port))));
    options.push(("instance".to_string(), text(&target.instance)));
    for (category, action) in policy.iter() {
        options.push((category.as_str().replace('_', "-"), text(action.as_str())));
    }
    options.push((
        "base".to_string(),
        text(&config.template_path().display().to_string()),
    ));
    options.push(("infile".to_string(), text(&config.input.display().to_string())));
    options.push(("outfile".to_string(), text(&output.display().to_string())));

    let block = sidecar::render_comments(
        &output.display().to_string(),
        &config.program_name,
        &options,
    );
    let path = sidecar_path(output);
    sidecar::prepend_comments(&path, &block)
        .map_err(|source| DenormaliseError::Sidecar { path, source })
}
