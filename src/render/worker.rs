//! Worker de calcul en arrière-plan.
//!
//! Reçoit des instantanés par valeur (variante, paramètres, viewport, région)
//! et renvoie des tableaux par valeur. Aucun état GPU n'est accessible depuis
//! ce thread.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::color::{build_lut, ColorSpace, PaletteStore};
use crate::error::{RenderError, Result};
use crate::fractal::{FractalParams, FractalType};
use crate::render::escape_time::{compute_field_cancellable, Field, Region};
use crate::render::viewport::Viewport;

/// Requête envoyée au worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequest {
    Field {
        variant: FractalType,
        params: FractalParams,
        viewport: Viewport,
        region: Region,
        samples_per_pixel: u32,
    },
    PaletteLut {
        palette_id: String,
        color_space: ColorSpace,
        steps: usize,
    },
}

/// Réponse du worker, corrélée à la requête par `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerResponse {
    Field { id: u64, values: Vec<f32>, width: u32, height: u32 },
    Lut { id: u64, rgba: Vec<u8> },
    /// La requête a été annulée avant la fin du calcul.
    Cancelled { id: u64 },
    Error { id: u64, message: String, stack: Option<String> },
}

impl WorkerResponse {
    pub fn id(&self) -> u64 {
        match self {
            WorkerResponse::Field { id, .. }
            | WorkerResponse::Lut { id, .. }
            | WorkerResponse::Cancelled { id }
            | WorkerResponse::Error { id, .. } => *id,
        }
    }

    pub fn into_field(self) -> Result<Field> {
        match self {
            WorkerResponse::Field { values, width, height, .. } => Ok(Field { values, width, height }),
            other => Err(other.into_error("field")),
        }
    }

    pub fn into_lut(self) -> Result<Vec<u8>> {
        match self {
            WorkerResponse::Lut { rgba, .. } => Ok(rgba),
            other => Err(other.into_error("lut")),
        }
    }

    fn into_error(self, expected: &str) -> RenderError {
        match self {
            WorkerResponse::Error { message, stack, .. } => RenderError::Worker { message, stack },
            WorkerResponse::Cancelled { id } => RenderError::Worker {
                message: format!("request {id} cancelled"),
                stack: None,
            },
            other => RenderError::Worker {
                message: format!("expected {expected} response, got request {}", other.id()),
                stack: None,
            },
        }
    }
}

struct Job {
    id: u64,
    request: WorkerRequest,
}

/// Traite une requête de façon synchrone. Utilisé par le thread du worker,
/// et directement par les appelants qui n'ont pas besoin de délestage.
pub fn handle_request(id: u64, request: &WorkerRequest, palettes: &PaletteStore) -> WorkerResponse {
    run_job(id, request, palettes, &AtomicBool::new(false))
}

fn run_job(id: u64, request: &WorkerRequest, palettes: &PaletteStore, abort: &AtomicBool) -> WorkerResponse {
    catch_job(id, || match request {
        WorkerRequest::Field { variant, params, viewport, region, samples_per_pixel } => {
            if viewport.width == 0 || viewport.height == 0 {
                return error_response(id, format!("empty viewport {}x{}", viewport.width, viewport.height));
            }
            match compute_field_cancellable(*variant, params, viewport, *region, *samples_per_pixel, abort) {
                Some(field) => WorkerResponse::Field {
                    id,
                    values: field.values,
                    width: field.width,
                    height: field.height,
                },
                None => WorkerResponse::Cancelled { id },
            }
        }
        WorkerRequest::PaletteLut { palette_id, color_space, steps } => {
            if *steps == 0 {
                return error_response(id, "palette lookup table needs at least one step".to_string());
            }
            let palette = palettes.resolve(palette_id);
            WorkerResponse::Lut { id, rgba: build_lut(palette, *steps, *color_space) }
        }
    })
}

fn error_response(id: u64, message: String) -> WorkerResponse {
    WorkerResponse::Error { id, message, stack: None }
}

/// Exécute `job` en convertissant une panique en réponse d'erreur.
fn catch_job<F: FnOnce() -> WorkerResponse>(id: u64, job: F) -> WorkerResponse {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!("Worker request {id} panicked: {message}");
        let backtrace = Backtrace::capture();
        let stack = (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());
        WorkerResponse::Error { id, message, stack }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Thread de calcul dédié, alimenté par un canal.
///
/// Les requêtes sont traitées dans l'ordre d'envoi. Le thread s'arrête quand
/// le worker est détruit.
pub struct RenderWorker {
    sender: Option<Sender<Job>>,
    receiver: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
    next_id: u64,
    /// Les requêtes d'identifiant ≤ à cette valeur sont annulées.
    cancelled_through: Arc<AtomicU64>,
    abort: Arc<AtomicBool>,
}

impl RenderWorker {
    pub fn spawn(palettes: PaletteStore) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (resp_tx, resp_rx) = mpsc::channel::<WorkerResponse>();
        let cancelled_through = Arc::new(AtomicU64::new(0));
        let abort = Arc::new(AtomicBool::new(false));

        let thread_cancelled = Arc::clone(&cancelled_through);
        let thread_abort = Arc::clone(&abort);
        let handle = thread::Builder::new()
            .name("fractal-worker".to_string())
            .spawn(move || {
                debug!("Worker thread started");
                for job in job_rx {
                    thread_abort.store(false, Ordering::SeqCst);
                    let response = if job.id <= thread_cancelled.load(Ordering::SeqCst) {
                        WorkerResponse::Cancelled { id: job.id }
                    } else {
                        run_job(job.id, &job.request, &palettes, &thread_abort)
                    };
                    if resp_tx.send(response).is_err() {
                        break;
                    }
                }
                debug!("Worker thread stopped");
            })
            .map_err(|e| RenderError::Worker { message: format!("cannot spawn worker: {e}"), stack: None })?;

        info!("Background worker started");
        Ok(Self {
            sender: Some(job_tx),
            receiver: resp_rx,
            handle: Some(handle),
            next_id: 1,
            cancelled_through,
            abort,
        })
    }

    /// Met une requête en file et renvoie son identifiant.
    pub fn submit(&mut self, request: WorkerRequest) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        let sender = self.sender.as_ref().ok_or_else(disconnected)?;
        sender.send(Job { id, request }).map_err(|_| disconnected())?;
        Ok(id)
    }

    /// Annule toutes les requêtes déjà soumises, y compris celle en cours.
    pub fn cancel_pending(&self) {
        self.cancelled_through.store(self.next_id - 1, Ordering::SeqCst);
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn try_recv(&self) -> Result<Option<WorkerResponse>> {
        match self.receiver.try_recv() {
            Ok(r) => Ok(Some(r)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    pub fn recv(&self) -> Result<WorkerResponse> {
        self.receiver.recv().map_err(|_| disconnected())
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WorkerResponse>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(r) => Ok(Some(r)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
        }
    }

    /// Soumet une requête et attend sa réponse (les réponses plus anciennes
    /// sont ignorées).
    pub fn compute(&mut self, request: WorkerRequest) -> Result<WorkerResponse> {
        let id = self.submit(request)?;
        loop {
            let response = self.recv()?;
            if response.id() == id {
                return Ok(response);
            }
            debug!("Dropping stale worker response {}", response.id());
        }
    }
}

fn disconnected() -> RenderError {
    RenderError::Worker { message: "worker thread disconnected".to_string(), stack: None }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.cancel_pending();
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }
    }
}
