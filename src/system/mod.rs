/*!
System: construction and orchestration of one simulation.

One thread per PE plus one for the interconnect, all paced by the
stepping clock. The driver (the caller of `run`) advances the clock
either as fast as it can (auto-run) or after an external gate fires
(stepping mode), until every PE is FINISHED and the interconnect has
drained.

Shared-state ownership:
- the interconnect owns its queues and the broadcast registry;
- shared memory sits behind one mutex, locked only by the interconnect
  worker during the run and by inspection/dumps afterwards;
- each cache is its own mutex, locked only by its owning PE during the
  run;
- PE execution states cross threads through the `ExecBoard`.

No worker ever holds more than one of these locks at a time.
*/

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::clock::StepClock;
use crate::dump::DumpSink;
use crate::error::SimError;
use crate::interconnect::{ArbitScheme, IcState, Interconnect, worker as ic_worker};
use crate::memory::{LocalCache, SharedMemory};
use crate::pe::{ExecBoard, Pe, worker as pe_worker};
use crate::stats::TransactionLog;

/// Upper limit on Processing Elements.
pub const MAX_PES: usize = 32;

/// Everything needed to build a `System`.
pub struct SystemConfig {
    pub pe_count: usize,
    pub scheme: ArbitScheme,
    /// Per-PE QoS classes; missing entries default to 0, extras are
    /// ignored with a warning.
    pub qos: Vec<u8>,
    /// Pre-decoded instruction words, one stream per PE.
    pub programs: Vec<Vec<u64>>,
    /// RNG seed for the initial memory fill (entropy when `None`).
    pub seed: Option<u64>,
    /// Fill caches and shared memory with random bytes at construction,
    /// matching the original tool's initialize flow. Tests usually leave
    /// state zeroed and install contents explicitly.
    pub randomize_state: bool,
    /// Abort the run after this many cycles (`None` = unbounded).
    pub max_cycles: Option<u64>,
}

impl SystemConfig {
    /// A config with empty programs, QoS 0 everywhere, zeroed state.
    pub fn new(pe_count: usize, scheme: ArbitScheme) -> Self {
        SystemConfig {
            pe_count,
            scheme,
            qos: Vec::new(),
            programs: vec![Vec::new(); pe_count],
            seed: None,
            randomize_state: false,
            max_cycles: None,
        }
    }
}

/// How the driver paces the clock.
pub enum Pacing {
    /// Advance as fast as possible.
    Auto,
    /// Call the gate before every cycle; it blocks until the operator
    /// (or a test) releases the next tick.
    Stepped(Box<dyn FnMut(u64)>),
}

/// Outcome of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles the driver advanced.
    pub cycles: u64,
    /// Transactions recorded in the log.
    pub transactions: usize,
    /// Messages dropped or rejected as protocol violations.
    pub protocol_violations: u64,
}

/// One simulation instance.
pub struct System {
    scheme: ArbitScheme,
    qos: Vec<u8>,
    programs: Vec<Vec<u64>>,
    max_cycles: Option<u64>,

    clock: Arc<StepClock>,
    ic: Arc<Interconnect>,
    shared_mem: Arc<Mutex<SharedMemory>>,
    caches: Vec<Arc<Mutex<LocalCache>>>,
    board: Arc<ExecBoard>,
    log: Arc<TransactionLog>,
    halt: Arc<AtomicBool>,
}

impl System {
    pub fn new(cfg: SystemConfig) -> Result<Self, SimError> {
        if cfg.pe_count == 0 || cfg.pe_count > MAX_PES {
            return Err(SimError::PeCount(cfg.pe_count));
        }
        if cfg.programs.len() != cfg.pe_count {
            return Err(SimError::ProgramCount {
                programs: cfg.programs.len(),
                pes: cfg.pe_count,
            });
        }
        if cfg.qos.len() > cfg.pe_count {
            warn!(
                entries = cfg.qos.len(),
                pes = cfg.pe_count,
                "ignoring QoS entries beyond the PE count"
            );
        }
        let mut qos = cfg.qos;
        qos.resize(cfg.pe_count, 0);

        let mut shared_mem = SharedMemory::new();
        let mut caches: Vec<LocalCache> = (0..cfg.pe_count).map(LocalCache::new).collect();
        if cfg.randomize_state {
            let mut rng = match cfg.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            shared_mem.fill_random(&mut rng);
            for cache in &mut caches {
                cache.fill_random(&mut rng);
            }
        }

        info!(
            pes = cfg.pe_count,
            scheme = ?cfg.scheme,
            "system created"
        );

        Ok(System {
            scheme: cfg.scheme,
            qos,
            programs: cfg.programs,
            max_cycles: cfg.max_cycles,
            clock: Arc::new(StepClock::new()),
            ic: Arc::new(Interconnect::new(cfg.pe_count, cfg.scheme)),
            shared_mem: Arc::new(Mutex::new(shared_mem)),
            caches: caches
                .into_iter()
                .map(|c| Arc::new(Mutex::new(c)))
                .collect(),
            board: Arc::new(ExecBoard::new(cfg.pe_count)),
            log: Arc::new(TransactionLog::new()),
            halt: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn pe_count(&self) -> usize {
        self.programs.len()
    }

    pub fn scheme(&self) -> ArbitScheme {
        self.scheme
    }

    pub fn interconnect(&self) -> &Interconnect {
        &self.ic
    }

    pub fn transaction_log(&self) -> &TransactionLog {
        &self.log
    }

    pub fn cache(&self, pe: usize) -> MutexGuard<'_, LocalCache> {
        self.caches[pe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shared_memory(&self) -> MutexGuard<'_, SharedMemory> {
        self.shared_mem
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the simulation to completion (or to the cycle ceiling).
    pub fn run(&mut self, mut pacing: Pacing) -> Result<RunSummary, SimError> {
        self.halt.store(false, Ordering::Relaxed);
        self.board.reset();

        let mut handles = Vec::with_capacity(self.pe_count() + 1);
        for (i, program) in self.programs.iter().enumerate() {
            let pe = Pe::new(i, self.qos[i], program.clone());
            let cache = Arc::clone(&self.caches[i]);
            let ic = Arc::clone(&self.ic);
            let clock = Arc::clone(&self.clock);
            let board = Arc::clone(&self.board);
            let log = Arc::clone(&self.log);
            let halt = Arc::clone(&self.halt);
            let spawned = thread::Builder::new()
                .name(format!("pe-{i}"))
                .spawn(move || pe_worker::run(pe, &cache, &ic, &clock, &board, &log, &halt));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    self.abort_workers(handles);
                    return Err(SimError::Io(e));
                }
            }
        }
        {
            let ic = Arc::clone(&self.ic);
            let shared = Arc::clone(&self.shared_mem);
            let clock = Arc::clone(&self.clock);
            let board = Arc::clone(&self.board);
            let halt = Arc::clone(&self.halt);
            let spawned = thread::Builder::new()
                .name("interconnect".into())
                .spawn(move || ic_worker::run(&ic, &shared, &clock, &board, &halt));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    self.abort_workers(handles);
                    return Err(SimError::Io(e));
                }
            }
        }

        let mut cycles: u64 = 0;
        let outcome = loop {
            if self.board.all_finished() && self.ic.state() == IcState::Finished {
                break Ok(());
            }
            if let Some(limit) = self.max_cycles {
                if cycles >= limit {
                    break Err(SimError::CycleLimit(limit));
                }
            }
            if let Pacing::Stepped(gate) = &mut pacing {
                gate(cycles);
            }
            self.clock.advance();
            cycles += 1;
            thread::yield_now();
        };

        match outcome {
            Ok(()) => {
                for h in handles {
                    let _ = h.join();
                }
                let summary = RunSummary {
                    cycles,
                    transactions: self.log.len(),
                    protocol_violations: self.ic.protocol_violations(),
                };
                info!(
                    cycles = summary.cycles,
                    transactions = summary.transactions,
                    violations = summary.protocol_violations,
                    "run complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.abort_workers(handles);
                Err(e)
            }
        }
    }

    /// Wake and join every worker after a failed or aborted run.
    fn abort_workers(&self, handles: Vec<thread::JoinHandle<()>>) {
        self.halt.store(true, Ordering::Relaxed);
        // One more tick releases anyone parked in the clock.
        self.clock.advance();
        for h in handles {
            let _ = h.join();
        }
    }

    /// Snapshot caches and shared memory through `sink`. IO failures are
    /// reported and skipped; the simulator never dies over a dump.
    pub fn dump_state(&self, sink: &mut dyn DumpSink) {
        for (i, cache) in self.caches.iter().enumerate() {
            let cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
            emit(sink, &format!("cache_{i}.txt"), cache.dump_text().as_bytes());
            emit(
                sink,
                &format!("cache_{i}_invalid.txt"),
                cache.dump_flags().as_bytes(),
            );
        }
        let mem = self.shared_memory();
        emit(sink, "shared_memory.txt", mem.dump_text().as_bytes());
        emit(sink, "shared_memory.bin", &mem.dump_binary());
    }
}

fn emit(sink: &mut dyn DumpSink, name: &str, contents: &[u8]) {
    if let Err(e) = sink.emit(name, contents) {
        warn!(file = name, error = %e, "dump failed, continuing without it");
    }
}
