use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Traffic direction, from the client point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Request => "->",
            Direction::Response => "<-",
        }
    }
}

/// Append-only file sink mirroring raw protocol traffic.
#[derive(Clone)]
pub struct WireTracer {
    file: Arc<Mutex<std::fs::File>>,
}

impl WireTracer {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn line(&self, direction: Direction, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{} {text}", direction.marker());
        }
    }
}

impl std::fmt::Debug for WireTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireTracer").finish_non_exhaustive()
    }
}
