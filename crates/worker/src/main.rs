#![forbid(unsafe_code)]

mod exec;

use exec::ProcessGenerator;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;
use tm_core::ids::ProjectId;
use tm_engine::{Engine, Generator};
use tm_storage::ClaimedJob;

const DEFAULT_STORE_DIRNAME: &str = ".taskmill";
const DEFAULT_POLL_MS: u64 = 2_000;
const DEFAULT_LEASE_TTL_MS: u64 = 120_000;
const DEFAULT_GENERATOR_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug)]
struct WorkerConfig {
    storage_dir: PathBuf,
    runner_id: String,
    poll_ms: u64,
    lease_ttl_ms: u64,
    generator_bin: Option<String>,
    generator_timeout_ms: u64,
    once: bool,
}

fn usage() -> &'static str {
    "tm_worker — execute queued taskmill generation jobs\n\n\
USAGE:\n\
  tm_worker [--storage-dir DIR] [--runner-id ID] [--poll-ms MS]\n\
            [--lease-ttl-ms MS] [--generator-bin PATH]\n\
            [--generator-timeout-ms MS] [--once]\n\n\
NOTES:\n\
  - Without --generator-bin (or TM_GENERATOR_BIN) the deterministic local\n\
    heuristic produces the proposals; jobs never fail on generator trouble.\n\
  - --once drains at most one job and exits (smoke test).\n"
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_ms(raw: &str, flag: &'static str) -> Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| format!("{flag} expects a millisecond count, got {raw:?}"))
}

fn parse_args() -> Result<WorkerConfig, String> {
    let mut storage_dir = env_var("TM_STORAGE_DIR").map(PathBuf::from);
    let mut runner_id = env_var("TM_RUNNER_ID");
    let mut poll_ms = match env_var("TM_POLL_MS") {
        Some(v) => Some(parse_ms(&v, "TM_POLL_MS")?),
        None => None,
    };
    let mut lease_ttl_ms = match env_var("TM_LEASE_TTL_MS") {
        Some(v) => Some(parse_ms(&v, "TM_LEASE_TTL_MS")?),
        None => None,
    };
    let mut generator_bin = env_var("TM_GENERATOR_BIN");
    let mut generator_timeout_ms = match env_var("TM_GENERATOR_TIMEOUT_MS") {
        Some(v) => Some(parse_ms(&v, "TM_GENERATOR_TIMEOUT_MS")?),
        None => None,
    };
    let mut once = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut take_value = |flag: &'static str| {
            args.next().ok_or_else(|| format!("{flag} expects a value"))
        };
        match arg.as_str() {
            "--storage-dir" => storage_dir = Some(PathBuf::from(take_value("--storage-dir")?)),
            "--runner-id" => runner_id = Some(take_value("--runner-id")?),
            "--poll-ms" => poll_ms = Some(parse_ms(&take_value("--poll-ms")?, "--poll-ms")?),
            "--lease-ttl-ms" => {
                lease_ttl_ms = Some(parse_ms(&take_value("--lease-ttl-ms")?, "--lease-ttl-ms")?)
            }
            "--generator-bin" => generator_bin = Some(take_value("--generator-bin")?),
            "--generator-timeout-ms" => {
                generator_timeout_ms = Some(parse_ms(
                    &take_value("--generator-timeout-ms")?,
                    "--generator-timeout-ms",
                )?)
            }
            "--once" => once = true,
            "--help" | "-h" => return Err(usage().to_string()),
            other => return Err(format!("unknown argument {other:?}\n\n{}", usage())),
        }
    }

    let storage_dir = storage_dir.unwrap_or_else(|| {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_STORE_DIRNAME)
    });
    let runner_id =
        runner_id.unwrap_or_else(|| format!("tm-worker-{}", std::process::id()));

    Ok(WorkerConfig {
        storage_dir,
        runner_id,
        poll_ms: poll_ms.unwrap_or(DEFAULT_POLL_MS),
        lease_ttl_ms: lease_ttl_ms.unwrap_or(DEFAULT_LEASE_TTL_MS),
        generator_bin,
        generator_timeout_ms: generator_timeout_ms.unwrap_or(DEFAULT_GENERATOR_TIMEOUT_MS),
        once,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = match parse_args() {
        Ok(cfg) => cfg,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let mut engine = Engine::open(&cfg.storage_dir)?;
    eprintln!(
        "tm_worker: runner {} polling {}",
        cfg.runner_id,
        cfg.storage_dir.display()
    );

    loop {
        let reset = engine.store_mut().job_requeue_stale()?;
        if reset > 0 {
            eprintln!("tm_worker: requeued {reset} stale job(s)");
        }

        match engine
            .store_mut()
            .job_claim_next(&cfg.runner_id, cfg.lease_ttl_ms)?
        {
            Some(claimed) => run_job(&mut engine, &cfg, claimed),
            None => {
                if cfg.once {
                    break;
                }
                sleep(Duration::from_millis(cfg.poll_ms));
                continue;
            }
        }

        if cfg.once {
            break;
        }
    }

    Ok(())
}

fn run_job(engine: &mut Engine, cfg: &WorkerConfig, claimed: ClaimedJob) {
    let ClaimedJob { project, job } = claimed;
    eprintln!("tm_worker: claimed {} (project {project})", job.id);

    let Ok(project_id) = ProjectId::try_new(project.as_str()) else {
        // Enqueue validates project ids, so this is store corruption; leave
        // the claim to expire back into the queue and surface it.
        eprintln!("tm_worker: job {} carries an invalid project id", job.id);
        return;
    };

    let result = execute(engine, cfg, &project_id, job.doc_version);
    let finished = match result {
        Ok(summary) => {
            eprintln!("tm_worker: {} done ({summary})", job.id);
            engine.store_mut().job_complete(
                &project_id,
                &job.id,
                &cfg.runner_id,
                job.revision,
                Some(summary),
            )
        }
        Err(reason) => {
            eprintln!("tm_worker: {} failed ({reason})", job.id);
            engine.store_mut().job_fail(
                &project_id,
                &job.id,
                &cfg.runner_id,
                job.revision,
                Some(reason),
            )
        }
    };
    if let Err(err) = finished {
        eprintln!("tm_worker: could not record outcome for {}: {err}", job.id);
    }
}

fn execute(
    engine: &mut Engine,
    cfg: &WorkerConfig,
    project: &ProjectId,
    doc_version: Option<i64>,
) -> Result<String, String> {
    let version = match doc_version {
        Some(version) => version,
        None => engine
            .store()
            .document_latest_version(project)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no document version to reconcile".to_string())?,
    };

    let process_generator = cfg
        .generator_bin
        .as_deref()
        .map(|bin| ProcessGenerator::new(bin, cfg.generator_timeout_ms));
    let generator = process_generator.as_ref().map(|g| g as &dyn Generator);

    let outcome = engine
        .reconcile_version(project, version, generator)
        .map_err(|e| e.to_string())?;

    Ok(format!(
        "created={} updated={} obsoleted={} questions={}",
        outcome.outcome.created.len(),
        outcome.outcome.updated.len(),
        outcome.outcome.obsoleted.len(),
        outcome.questions.len()
    ))
}
