use crate::config::StackConfig;
use internment::Intern;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::debug;

/// One resolved entry of a captured call stack.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct StackFrame {
    /// Instruction pointer
    pub pc: usize,
    /// Source file, empty when the debug info carries none
    pub file: Intern<String>,
    /// Source line (1-based), 0 when unknown
    pub line: u32,
    /// Fully-qualified function name, without the symbol hash
    pub function: Intern<String>,
    /// Function name with the module path and receiver type stripped
    pub short_name: Intern<String>,
}

impl StackFrame {
    fn from_symbol(pc: usize, symbol: &backtrace::Symbol) -> Option<Self> {
        let name = symbol.name()?;
        let function = format!("{name:#}");
        let file = symbol
            .filename()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Self {
            pc,
            short_name: Intern::new(short_name(&function).to_owned()),
            function: Intern::new(function),
            file: Intern::new(file),
            line: symbol.lineno().unwrap_or(0),
        })
    }

    /// Returns the source code line of the frame.
    /// If the source cannot be read for any reason, `None` is returned.
    pub fn source(&self) -> Option<String> {
        let idx = usize::try_from(self.line.checked_sub(1)?).ok()?;
        let file = File::open(self.file.as_str()).ok()?;
        BufReader::new(file).lines().nth(idx)?.ok()
    }
}

/// Name of this crate as it appears at the head of demangled paths
const CRATE_NAME: &str = env!("CARGO_CRATE_NAME");

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Phase {
    /// Frames of the unwinder itself, before the first library frame
    Unwinder,
    Library,
    User,
}

/// Capture the stack of the calling thread, starting at the first frame
/// outside of the configured library root.
///
/// At most [`StackConfig::max_depth`] frames are recorded. Frames whose
/// program counter doesn't resolve to a symbol are omitted.
#[inline(never)]
pub fn capture_stack(cfg: &StackConfig) -> Vec<StackFrame> {
    if cfg.max_depth == 0 {
        return Vec::new();
    }
    let mut trimmer = Trimmer::new(cfg, std::env::current_dir().ok());

    backtrace::trace(|raw| {
        let pc = raw.ip() as usize;
        let mut resolved = Vec::new();
        backtrace::resolve_frame(raw, |symbol| {
            if let Some(f) = StackFrame::from_symbol(pc, symbol) {
                resolved.push(f);
            }
        });
        if resolved.is_empty() {
            debug!(pc, "Omitting unresolved stack frame");
        }
        resolved.into_iter().all(|frame| trimmer.push(frame))
    });

    trimmer.finish()
}

/// Drops the unwinder and library frames from the innermost end of a stack.
///
/// Frames are pushed innermost first.
struct Trimmer<'a> {
    cfg: &'a StackConfig,
    cwd: Option<PathBuf>,
    phase: Phase,
    frames: Vec<StackFrame>,
    // Used only if no library frame is ever seen
    fallback: Vec<StackFrame>,
}

impl<'a> Trimmer<'a> {
    fn new(cfg: &'a StackConfig, cwd: Option<PathBuf>) -> Self {
        Self {
            cfg,
            cwd,
            phase: Phase::Unwinder,
            frames: Vec::new(),
            fallback: Vec::new(),
        }
    }

    /// Returns false once enough user frames are recorded.
    fn push(&mut self, frame: StackFrame) -> bool {
        let is_library = self.is_library(&frame);
        match self.phase {
            Phase::Unwinder if is_library => self.phase = Phase::Library,
            Phase::Unwinder => {
                if self.fallback.len() < self.cfg.max_depth && !is_unwinder_frame(&frame) {
                    self.fallback.push(frame);
                }
            }
            Phase::Library if is_library => (),
            Phase::Library | Phase::User => {
                self.phase = Phase::User;
                self.frames.push(frame);
                if self.frames.len() >= self.cfg.max_depth {
                    return false;
                }
            }
        }
        true
    }

    /// Builds without debug info carry no file, so the symbol path decides.
    fn is_library(&self, frame: &StackFrame) -> bool {
        if frame.file.is_empty() {
            is_library_function(&frame.function)
        } else {
            is_library_file(&frame.file, &self.cfg.library_root, self.cwd.as_deref())
        }
    }

    fn finish(self) -> Vec<StackFrame> {
        if self.phase == Phase::Unwinder {
            debug!(
                library_root = %self.cfg.library_root.display(),
                "No library frame found on the stack"
            );
            return self.fallback;
        }
        self.frames
    }
}

fn is_unwinder_frame(frame: &StackFrame) -> bool {
    let f = frame.function.as_str();
    f.starts_with("backtrace::") || f.starts_with("_Unwind") || f.starts_with("__rust")
}

fn is_library_function(function: &str) -> bool {
    function
        .trim_start_matches('<')
        .strip_prefix(CRATE_NAME)
        .is_some_and(|rest| rest.starts_with("::"))
}

fn is_library_file(file: &str, root: &Path, cwd: Option<&Path>) -> bool {
    if file.is_empty() {
        return false;
    }
    let path = Path::new(file);
    if path.starts_with(root) {
        return true;
    }
    match cwd {
        Some(cwd) if path.is_relative() => cwd.join(path).starts_with(root),
        _ => false,
    }
}

/// Last `::` segment outside of generic brackets. A trailing closure
/// segment stays attached to its owner.
fn short_name(function: &str) -> &str {
    let bytes = function.as_bytes();
    let mut depth = 0_usize;
    let mut starts = vec![0];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                starts.push(i + 2);
                i += 1;
            }
            _ => (),
        }
        i += 1;
    }

    let mut start = starts[starts.len() - 1];
    if &function[start..] == "{{closure}}" && starts.len() > 1 {
        start = starts[starts.len() - 2];
    }
    &function[start..]
}
