//! Sync run coordinator
//!
//! Logs on, runs the configured steps in their fixed order and always logs
//! out again. The first failing step aborts the rest of the run; writes
//! already committed to the workforce service stay as they are.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::context::RunContext;
use super::employee::{EmployeeOutcome, EmployeeSyncer};
use super::entity::{EntitySyncer, SyncOutcome};
use super::events::{EventImportReport, EventImporter};
use crate::config::{SyncConfig, SyncStep};
use crate::error::Result;
use crate::remote::WorkforceService;
use crate::store::LocalStore;

/// Credentials for the workforce service session
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// What a completed run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<SyncStep>,
    pub departments: Option<SyncOutcome>,
    pub posts: Option<SyncOutcome>,
    pub employees: Option<EmployeeOutcome>,
    pub registration_points: Option<SyncOutcome>,
    pub events: Option<EventImportReport>,
}

/// One sync run against a source store and a workforce service
pub struct SyncRun<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    remote: &'a R,
    config: SyncConfig,
}

impl<'a, S, R> SyncRun<'a, S, R>
where
    S: LocalStore + ?Sized,
    R: WorkforceService + ?Sized,
{
    pub fn new(store: &'a S, remote: &'a R, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    /// Log on, run all configured steps, log out
    ///
    /// Logout is attempted even when a step failed; the step's error wins
    /// over a logout error.
    pub fn execute(&self, credentials: &Credentials) -> Result<RunSummary> {
        self.config.validate()?;
        let session = self
            .remote
            .logon(&credentials.login, &credentials.password)?;
        tracing::info!(login = %credentials.login, "Logged on to workforce service");

        let mut ctx = RunContext::new(session, self.config.clone(), Utc::now());
        let result = self.run_steps(&mut ctx);

        let logout = self.remote.logout(&ctx.session);
        match (result, logout) {
            (Ok(summary), Ok(())) => {
                tracing::info!("Sync run completed");
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), logout) => {
                if let Err(logout_err) = logout {
                    tracing::warn!("Logout after failed run also failed: {}", logout_err);
                }
                tracing::error!("Sync run aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Run the configured steps inside an existing run context
    pub fn run_steps(&self, ctx: &mut RunContext) -> Result<RunSummary> {
        let mut steps = ctx.config.steps.clone();
        steps.sort();
        steps.dedup();

        let mut summary = RunSummary {
            started_at: Some(ctx.started_at),
            steps: steps.clone(),
            ..Default::default()
        };

        for step in steps {
            tracing::info!(step = %step, "Starting sync step");
            match step {
                SyncStep::Departments => {
                    summary.departments = Some(self.sync_departments(ctx)?);
                }
                SyncStep::Posts => {
                    summary.posts = Some(self.sync_posts(ctx)?);
                }
                SyncStep::Employees => {
                    let outcome = EmployeeSyncer::new(self.remote).sync(self.store, ctx)?;
                    summary.employees = Some(outcome);
                }
                SyncStep::RegistrationPoints => {
                    summary.registration_points = Some(self.sync_registration_points(ctx)?);
                }
                SyncStep::Events => {
                    let report = EventImporter::new(self.remote).import(self.store, ctx)?;
                    summary.events = Some(report);
                }
            }
        }

        summary.completed_at = Some(Utc::now());
        Ok(summary)
    }

    fn sync_departments(&self, ctx: &mut RunContext) -> Result<SyncOutcome> {
        let page_size = ctx.config.reload_page_size;
        self.remote.heartbeat(&ctx.session)?;
        let rows = self.store.list_departments()?;
        ctx.departments.reload(self.remote, &ctx.session, page_size)?;
        EntitySyncer::new(self.remote, &ctx.session).sync(&mut ctx.departments, &rows)
    }

    fn sync_posts(&self, ctx: &mut RunContext) -> Result<SyncOutcome> {
        let page_size = ctx.config.reload_page_size;
        self.remote.heartbeat(&ctx.session)?;
        let rows = self.store.list_posts()?;
        ctx.posts.reload(self.remote, &ctx.session, page_size)?;
        EntitySyncer::new(self.remote, &ctx.session).sync(&mut ctx.posts, &rows)
    }

    fn sync_registration_points(&self, ctx: &mut RunContext) -> Result<SyncOutcome> {
        let page_size = ctx.config.reload_page_size;
        self.remote.heartbeat(&ctx.session)?;
        let rows = self.store.list_registration_points()?;
        ctx.registration_points.reload(self.remote, &ctx.session, page_size)?;
        EntitySyncer::new(self.remote, &ctx.session).sync(&mut ctx.registration_points, &rows)
    }
}
