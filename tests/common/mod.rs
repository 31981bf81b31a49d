//! Purpose: In-process storage simulator plugin for integration tests.
//! Exports: `SimDir`, `SimHandle`, `Mode`, `init_tracing`, plus fixture helpers.
//! Role: Speaks the plugin wire protocol on a `UnixListener` inside a temp directory.
//! Invariants: State lives in memory behind one mutex; every connection gets its own thread.
//! Invariants: Counters record accepted connections and requests per plugin socket.
#![allow(dead_code)]

use lsm_client::Locator;
use lsm_client::core::frame::{read_frame, write_frame};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

pub const SYSTEM_ID: &str = "sim-01";
pub const POOL_ID: &str = "POO1";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// How long-running operations answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Return the created entity immediately.
    Immediate,
    /// Return a job id that completes after one in-progress poll.
    Jobs,
}

/// Temp directory standing in for the daemon's socket directory.
pub struct SimDir {
    dir: TempDir,
}

impl SimDir {
    pub fn new() -> TestResult<Self> {
        init_tracing();
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn locator(&self) -> Locator {
        Locator::new().with_base_dir(self.dir.path())
    }

    pub fn spawn(&self, scheme: &str, mode: Mode) -> TestResult<SimHandle> {
        let socket = self.dir.path().join(scheme);
        let listener = UnixListener::bind(&socket)?;
        let handle = SimHandle {
            socket,
            connections: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
            state: Arc::new(Mutex::new(SimState::new(scheme, mode))),
        };
        let accept = handle.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    break;
                };
                accept.connections.fetch_add(1, Ordering::SeqCst);
                let session = accept.clone();
                thread::spawn(move || session.serve(stream));
            }
        });
        Ok(handle)
    }

    /// Bind a socket nobody accepts on, then close it, leaving a stale path behind.
    pub fn stale_socket(&self, scheme: &str) -> TestResult<PathBuf> {
        let path = self.dir.path().join(scheme);
        drop(UnixListener::bind(&path)?);
        Ok(path)
    }
}

#[derive(Clone)]
pub struct SimHandle {
    socket: PathBuf,
    connections: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Method names received so far, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.lock().methods.clone()
    }

    pub fn last_args(&self, method: &str) -> Option<Map<String, Value>> {
        self.lock().last_args.get(method).cloned()
    }

    /// Answer `method` with `result` verbatim from now on.
    pub fn override_result(&self, method: &str, result: Value) {
        self.lock().overrides.insert(method.to_string(), result);
    }

    /// Hold the next reply to `method` for `delay` before writing it.
    pub fn delay_reply(&self, method: &str, delay: Duration) {
        self.lock().delays.insert(method.to_string(), delay);
    }

    /// Finish every job after its first poll with an ERROR status carrying `code` and `message`.
    pub fn fail_jobs(&self, code: i64, message: &str) {
        self.lock().job_failure = Some(json!({ "code": code, "message": message }));
    }

    /// Remove the socket path so later connects fail.
    pub fn unlink(&self) -> TestResult<()> {
        std::fs::remove_file(&self.socket)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn serve(&self, mut stream: UnixStream) {
        while let Ok(frame) = read_frame(&mut stream) {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let response = match serde_json::from_slice::<Value>(&frame) {
                Ok(request) => {
                    let (response, delay) = {
                        let mut state = self.lock();
                        let method = request["method"].as_str().unwrap_or_default();
                        let delay = state.delays.remove(method);
                        (state.dispatch(request), delay)
                    };
                    if let Some(delay) = delay {
                        thread::sleep(delay);
                    }
                    response
                }
                Err(err) => error_envelope(1, &format!("bad request json: {err}")),
            };
            let Ok(payload) = serde_json::to_vec(&response) else {
                break;
            };
            if write_frame(&mut stream, &payload).is_err() {
                break;
            }
        }
    }
}

struct SimJob {
    polls: u32,
    item: Value,
}

struct SimState {
    description: String,
    mode: Mode,
    timeout: u64,
    next_id: u64,
    pools: Vec<Value>,
    volumes: Vec<Value>,
    jobs: HashMap<String, SimJob>,
    overrides: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    job_failure: Option<Value>,
    methods: Vec<String>,
    last_args: HashMap<String, Map<String, Value>>,
}

impl SimState {
    fn new(scheme: &str, mode: Mode) -> Self {
        Self {
            description: format!("{scheme} storage simulator"),
            mode,
            timeout: 0,
            next_id: 1,
            pools: vec![pool_json(POOL_ID, "Pool 1")],
            volumes: Vec::new(),
            jobs: HashMap::new(),
            overrides: HashMap::new(),
            delays: HashMap::new(),
            job_failure: None,
            methods: Vec::new(),
            last_args: HashMap::new(),
        }
    }

    fn dispatch(&mut self, request: Value) -> Value {
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let args = request["args"].as_object().cloned().unwrap_or_default();
        self.methods.push(method.clone());
        self.last_args.insert(method.clone(), args.clone());
        if let Some(result) = self.overrides.get(&method) {
            return json!({ "result": result });
        }
        match self.handle(&method, &args) {
            Ok(result) => json!({ "result": result }),
            Err((code, message)) => error_envelope(code, &message),
        }
    }

    fn handle(&mut self, method: &str, args: &Map<String, Value>) -> Result<Value, (i64, String)> {
        match method {
            "plugin_register" => {
                self.timeout = args["timeout"].as_u64().unwrap_or_default();
                Ok(Value::Null)
            }
            "plugin_unregister" => Ok(Value::Null),
            "time_out_set" => {
                self.timeout = args["ms"].as_u64().unwrap_or_default();
                Ok(Value::Null)
            }
            "time_out_get" => Ok(json!(self.timeout)),
            "plugin_info" => Ok(json!([self.description, "1.0"])),
            "systems" => Ok(json!([system_json()])),
            "capabilities" => Ok(json!({"class": "Capabilities", "cap": capability_hex()})),
            "pools" => Ok(filtered(&self.pools, args)),
            "volumes" => Ok(filtered(&self.volumes, args)),
            "volume_create" => self.volume_create(args),
            "volume_delete" => self.volume_delete(args),
            "job_status" => self.job_status(args),
            "job_free" => {
                let id = args["job_id"].as_str().unwrap_or_default();
                match self.jobs.remove(id) {
                    Some(_) => Ok(Value::Null),
                    None => Err((202, format!("job {id} not found"))),
                }
            }
            other => Err((225, format!("{other} is not implemented"))),
        }
    }

    fn volume_create(&mut self, args: &Map<String, Value>) -> Result<Value, (i64, String)> {
        let pool_id = args["pool"]["id"].as_str().unwrap_or_default();
        if !self.pools.iter().any(|pool| pool["id"] == pool_id) {
            return Err((203, format!("pool {pool_id} not found")));
        }
        let size = args["size_bytes"].as_u64().unwrap_or_default();
        let id = self.allocate("VOL");
        let volume = json!({
            "class": "Volume",
            "id": id,
            "name": args["volume_name"],
            "vpd83": "",
            "block_size": 512,
            "num_of_blocks": size / 512,
            "status": 1,
            "system_id": SYSTEM_ID,
            "pool_id": pool_id,
        });
        match self.mode {
            Mode::Immediate => {
                self.volumes.push(volume.clone());
                Ok(json!([null, volume]))
            }
            Mode::Jobs => {
                let job = self.allocate("JOB");
                self.jobs.insert(job.clone(), SimJob { polls: 0, item: volume });
                Ok(json!([job, null]))
            }
        }
    }

    fn volume_delete(&mut self, args: &Map<String, Value>) -> Result<Value, (i64, String)> {
        let id = args["volume"]["id"].as_str().unwrap_or_default();
        let Some(index) = self.volumes.iter().position(|volume| volume["id"] == id) else {
            return Err((205, format!("volume {id} not found")));
        };
        self.volumes.remove(index);
        match self.mode {
            Mode::Immediate => Ok(Value::Null),
            Mode::Jobs => {
                let job = self.allocate("JOB");
                self.jobs.insert(job.clone(), SimJob { polls: 0, item: Value::Null });
                Ok(json!(job))
            }
        }
    }

    fn job_status(&mut self, args: &Map<String, Value>) -> Result<Value, (i64, String)> {
        let id = args["job_id"].as_str().unwrap_or_default();
        let Some(job) = self.jobs.get_mut(id) else {
            return Err((202, format!("job {id} not found")));
        };
        job.polls += 1;
        if job.polls == 1 {
            return Ok(json!([1, 50, null]));
        }
        if let Some(failure) = &self.job_failure {
            return Ok(json!([4, 50, failure]));
        }
        let item = job.item.clone();
        if job.polls == 2 && item["class"] == "Volume" {
            self.volumes.push(item.clone());
        }
        Ok(json!([2, 100, item]))
    }

    fn allocate(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{:04}", self.next_id);
        self.next_id += 1;
        id
    }
}

fn filtered(items: &[Value], args: &Map<String, Value>) -> Value {
    let key = args.get("search_key").and_then(Value::as_str);
    let value = args.get("search_value").and_then(Value::as_str);
    let matches = |item: &&Value| match (key, value) {
        (Some(key), Some(value)) => item[key] == value,
        _ => true,
    };
    Value::Array(items.iter().filter(matches).cloned().collect())
}

fn error_envelope(code: i64, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

/// Volumes (20), volume create (21) and volume delete (33) supported.
fn capability_hex() -> String {
    let mut bitmap = vec!["00"; 40];
    for index in [20, 21, 33] {
        bitmap[index] = "01";
    }
    bitmap.concat()
}

pub fn system_json() -> Value {
    json!({"class": "System", "id": SYSTEM_ID, "name": "Storage simulator", "status": 1})
}

pub fn pool_json(id: &str, name: &str) -> Value {
    json!({
        "class": "Pool",
        "id": id,
        "name": name,
        "total_space": 100u64 * 1024 * 1024 * 1024,
        "free_space": 80u64 * 1024 * 1024 * 1024,
        "status": 1,
        "system_id": SYSTEM_ID,
    })
}
