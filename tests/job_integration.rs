//! Purpose: End-to-end tests for asynchronous jobs and the dual-result contract.
//! Exports: None (integration test module).
//! Role: Drive volume create/delete through both immediate and job-mode simulators.
//! Invariants: Polling loops are bounded; the library imposes no poll interval.
//! Invariants: Every job observed terminal is freed exactly once.

mod common;

use common::{Mode, SimDir, TestResult};
use lsm_client::api::WireCode;
use lsm_client::api::{
    Async, Entity, ErrorKind, JobId, JobState, JobStatus, Pool, Provisioning, Search, Volume,
};
use lsm_client::Client;
use std::thread::sleep;
use std::time::Duration;

const TEN_MIB: u64 = 10 * 1024 * 1024;

fn connect(sim_dir: &SimDir) -> TestResult<(Client, Pool)> {
    let mut client = Client::connect("sim://", None, 30_000, &sim_dir.locator())?;
    let pool = client.pools(None)?.remove(0);
    Ok((client, pool))
}

fn wait_for<T: lsm_client::api::JobResult>(
    client: &mut Client,
    job: &lsm_client::api::Job<T>,
) -> TestResult<T> {
    for _ in 0..50 {
        match client.job_state(job)? {
            JobState::InProgress { percent } => {
                assert!(percent <= 100);
                sleep(Duration::from_millis(5));
            }
            JobState::Complete(result) => return Ok(result),
            JobState::Failed(err) => return Err(err.into()),
        }
    }
    Err("job did not finish".into())
}

#[test]
fn immediate_volume_create_is_listed_without_polling() -> TestResult<()> {
    let sim_dir = SimDir::new()?;
    let sim = sim_dir.spawn("sim", Mode::Immediate)?;
    let (mut client, pool) = connect(&sim_dir)?;
    let before = client.volumes(None)?.len();

    let outcome = client.volume_create(&pool, "TestVol", TEN_MIB, Provisioning::Default)?;
    let Async::Done(volume) = outcome else {
        panic!("immediate mode returned a job");
    };
    assert_eq!(volume.name, "TestVol");
    assert_eq!(volume.size_bytes(), TEN_MIB);
    assert_eq!(client.volumes(None)?.len(), before + 1);
    assert!(!sim.methods().iter().any(|method| method == "job_status"));

    let args = sim.last_args("volume_create").expect("args");
    assert_eq!(args["provisioning"], serde_json::json!(3));
    assert_eq!(args["pool"]["class"], serde_json::json!("Pool"));
    client.close()?;
    Ok(())
}

#[test]
fn job_volume_create_polls_to_completion_then_frees() -> TestResult<()> {
    let sim_dir = SimDir::new()?;
    let _sim = sim_dir.spawn("sim", Mode::Jobs)?;
    let (mut client, pool) = connect(&sim_dir)?;

    let outcome = client.volume_create(&pool, "TestVol", TEN_MIB, Provisioning::Default)?;
    let Async::Job(job) = outcome else {
        panic!("job mode returned an immediate volume");
    };
    assert_eq!(job.method(), "volume_create");

    let report = client.job_status(job.id())?;
    assert_eq!(report.status, JobStatus::InProgress);
    assert_eq!(report.percent, 50);

    let volume: Volume = wait_for(&mut client, &job)?;
    assert_eq!(volume.name, "TestVol");
    let listed = client.volumes(Some(&Search::new("id", volume.id.as_str())))?;
    assert_eq!(listed, vec![volume]);

    client.job_free(job.id())?;
    let err = client.job_status(job.id()).expect_err("freed job");
    assert_eq!(err.kind(), ErrorKind::NotFound(Entity::Job));
    client.close()?;
    Ok(())
}

#[test]
fn terminal_job_status_is_idempotent() -> TestResult<()> {
    let sim_dir = SimDir::new()?;
    let _sim = sim_dir.spawn("sim", Mode::Jobs)?;
    let (mut client, pool) = connect(&sim_dir)?;

    let outcome = client.volume_create(&pool, "Repeat", TEN_MIB, Provisioning::Thin)?;
    let job = outcome.job().cloned().expect("job");
    wait_for(&mut client, &job)?;

    let first = client.job_status(job.id())?;
    assert_eq!(first.status, JobStatus::Complete);
    assert!(first.item.is_some());
    for _ in 0..3 {
        assert_eq!(client.job_status(job.id())?, first);
    }
    assert_eq!(client.volumes(None)?.len(), 1);
    client.job_free(job.id())?;
    client.close()?;
    Ok(())
}

#[test]
fn failed_job_reports_the_plugin_error_verbatim() -> TestResult<()> {
    let sim_dir = SimDir::new()?;
    let sim = sim_dir.spawn("sim", Mode::Jobs)?;
    sim.fail_jobs(203, "pool POO1 went offline");
    let (mut client, pool) = connect(&sim_dir)?;

    let outcome = client.volume_create(&pool, "Doomed", TEN_MIB, Provisioning::Thin)?;
    let job = outcome.job().cloned().expect("job");
    assert!(matches!(client.job_state(&job)?, JobState::InProgress { percent: 50 }));
    let JobState::Failed(err) = client.job_state(&job)? else {
        panic!("job should have failed");
    };
    assert_eq!(err.kind(), ErrorKind::NotFound(Entity::Pool));
    assert_eq!(err.code(), Some(&WireCode::Number(203)));
    assert_eq!(err.message(), Some("pool POO1 went offline"));
    assert_eq!(err.method(), Some("volume_create"));

    let first = client.job_status(job.id())?;
    assert_eq!(first.status, JobStatus::Error);
    assert_eq!(client.job_status(job.id())?, first);
    assert!(client.volumes(None)?.is_empty());

    client.job_free(job.id())?;
    let err = client.job_status(job.id()).expect_err("freed job");
    assert_eq!(err.kind(), ErrorKind::NotFound(Entity::Job));
    client.close()?;
    Ok(())
}

#[test]
fn unknown_and_double_freed_jobs_are_not_found() -> TestResult<()> {
    let sim_dir = SimDir::new()?;
    let _sim = sim_dir.spawn("sim", Mode::Jobs)?;
    let (mut client, pool) = connect(&sim_dir)?;

    let never = JobId::new("JOB_9999");
    let err = client.job_status(&never).expect_err("unknown job");
    assert_eq!(err.kind(), ErrorKind::NotFound(Entity::Job));
    let err = client.job_free(&never).expect_err("unknown job");
    assert_eq!(err.kind(), ErrorKind::NotFound(Entity::Job));

    let outcome = client.volume_create(&pool, "Twice", TEN_MIB, Provisioning::Full)?;
    let job = outcome.job().cloned().expect("job");
    wait_for(&mut client, &job)?;
    client.job_free(job.id())?;
    let err = client.job_free(job.id()).expect_err("second free");
    assert_eq!(err.kind(), ErrorKind::NotFound(Entity::Job));
    client.close()?;
    Ok(())
}

#[test]
fn completion_only_operations_return_job_or_done() -> TestResult<()> {
    let sim_dir = SimDir::new()?;
    let _sim = sim_dir.spawn("sim", Mode::Immediate)?;
    let (mut client, pool) = connect(&sim_dir)?;
    let Async::Done(volume) = client.volume_create(&pool, "Gone", TEN_MIB, Provisioning::Thin)? else {
        panic!("immediate mode returned a job");
    };
    assert!(client.volume_delete(&volume)?.is_done());
    assert!(client.volumes(None)?.is_empty());
    client.close()?;

    let job_dir = SimDir::new()?;
    let _jobs = job_dir.spawn("sim", Mode::Jobs)?;
    let (mut client, pool) = connect(&job_dir)?;
    let Async::Job(create) = client.volume_create(&pool, "Gone", TEN_MIB, Provisioning::Thin)? else {
        panic!("job mode returned a volume");
    };
    let volume = wait_for(&mut client, &create)?;
    client.job_free(create.id())?;

    let Async::Job(delete) = client.volume_delete(&volume)? else {
        panic!("job mode completed delete immediately");
    };
    wait_for(&mut client, &delete)?;
    client.job_free(delete.id())?;
    client.close()?;
    Ok(())
}
