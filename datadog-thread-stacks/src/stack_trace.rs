// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::unwind_safety;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::sync::Once;

/// Maximum number of return addresses kept per trace.
pub const MAX_FRAMES: usize = 16;

/// Fixed-width hex digits per rendered frame address.
const HEX_ENTRY_LENGTH: usize = 2 * std::mem::size_of::<usize>();

/// Field width used when rendering pointers in symbolized output, matching
/// `%18p`: two characters per byte plus the leading `0x`.
const POINTER_FIELD_WIDTH: usize = 2 + 2 * std::mem::size_of::<usize>();

/// Options for the hex renderings of a trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexFormat {
    /// Prefix every frame with `0x`.
    pub ox_prefix: bool,
    /// Emit return addresses exactly as captured. By default each address is
    /// decremented by one so it points back into the calling instruction,
    /// which yields correct line numbers under external symbolizers.
    pub keep_return_addresses: bool,
}

/// A fixed-capacity record of raw return addresses, innermost frame first.
///
/// The record holds no heap pointers and is trivially copyable, so a signal
/// handler may write into one owned by another thread. Only the first
/// `num_frames` slots are meaningful.
#[derive(Clone, Copy)]
pub struct StackTrace {
    frames: [usize; MAX_FRAMES],
    num_frames: usize,
}

impl StackTrace {
    pub fn new() -> Self {
        Self {
            frames: [0; MAX_FRAMES],
            num_frames: 0,
        }
    }

    /// The captured return addresses, innermost first.
    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.num_frames]
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Whether a collection has populated this record.
    pub fn has_collected(&self) -> bool {
        self.num_frames > 0
    }

    pub fn reset(&mut self) {
        self.num_frames = 0;
    }

    /// Walks the current thread's call chain into this record, discarding
    /// the `collect` frame itself plus `skip_frames` outer frames.
    /// Collection stops at the first unwinder error or at [`MAX_FRAMES`].
    ///
    /// SAFETY (when called from the signal handler):
    ///     Performs no allocation and takes no locks beyond what the
    ///     unwinder itself does. The unwinder must have been primed
    ///     beforehand, see [`prime_unwinder`].
    #[inline(never)]
    pub fn collect(&mut self, skip_frames: usize) {
        self.num_frames = 0;
        if !unwind_safety::safe_to_unwind() {
            // Substitute a trace whose one symbolized frame explains itself,
            // rather than handing back something empty.
            self.frames[0] = could_not_collect_stack_trace_because_inside_libdl as usize + 1;
            self.num_frames = 1;
            return;
        }
        prime_unwinder();

        let anchor = Self::collect as usize;
        let (num_frames, anchor_seen) = walk_frames(&mut self.frames, skip_frames, Some(anchor));
        self.num_frames = if anchor_seen {
            num_frames
        } else {
            // The unwind tables could not attribute frames to functions, so
            // the collect frame was never recognized. Drop a fixed count
            // instead; the walk still lands near the caller.
            walk_frames(&mut self.frames, skip_frames + 1, None).0
        };
    }

    /// Renders the trace as space-separated fixed-width hex into a caller
    /// buffer, without allocating, and returns the number of bytes written.
    /// Frames that do not fit are dropped.
    pub fn stringify_hex(&self, buf: &mut [u8], format: HexFormat) -> usize {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let prefix_len = if format.ox_prefix { 2 } else { 0 };
        let mut pos = 0;
        for (i, &frame) in self.frames().iter().enumerate() {
            let entry_len = HEX_ENTRY_LENGTH + prefix_len + usize::from(i != 0);
            if pos + entry_len > buf.len() {
                break;
            }
            if i != 0 {
                buf[pos] = b' ';
                pos += 1;
            }
            if format.ox_prefix {
                buf[pos] = b'0';
                buf[pos + 1] = b'x';
                pos += 2;
            }
            let mut addr = frame;
            if addr > 0 && !format.keep_return_addresses {
                // A return address points one past its call instruction;
                // step back into the call so external symbolizers report the
                // calling line. Zero is kept as-is, it marks a broken frame.
                addr -= 1;
            }
            for shift in (0..HEX_ENTRY_LENGTH).rev() {
                buf[pos] = DIGITS[(addr >> (shift * 4)) & 0xf];
                pos += 1;
            }
        }
        pos
    }

    pub fn to_hex_string(&self) -> String {
        self.to_hex_string_with(HexFormat::default())
    }

    pub fn to_hex_string_with(&self, format: HexFormat) -> String {
        let mut buf = [0u8; MAX_FRAMES * (HEX_ENTRY_LENGTH + 3)];
        let len = self.stringify_hex(&mut buf, format);
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    /// Renders one `    @ <addr>  <symbol>` line per frame. Frames that the
    /// symbolizer cannot resolve, and zero frames, come out as `(unknown)`.
    pub fn symbolize(&self) -> String {
        let mut out = String::new();
        for &pc in self.frames() {
            let mut symbol: Option<String> = None;
            if pc != 0 {
                // Resolve the calling instruction, not the return address,
                // so a call in the last position of a function does not get
                // attributed to whatever code follows it.
                backtrace::resolve((pc - 1) as *mut std::ffi::c_void, |sym| {
                    if symbol.is_none() {
                        symbol = sym.name().map(|name| name.to_string());
                    }
                });
            }
            let _ = writeln!(
                out,
                "    @ {:>width$}  {}",
                format!("{pc:#x}"),
                symbol.as_deref().unwrap_or("(unknown)"),
                width = POINTER_FIELD_WIDTH,
            );
        }
        out
    }

    /// The symbol-free variant of [`symbolize`](Self::symbolize), suitable
    /// for log files that are symbolized offline.
    pub fn to_log_format_hex_string(&self) -> String {
        let mut out = String::new();
        for &pc in self.frames() {
            let _ = writeln!(
                out,
                "    @ {:>width$}",
                format!("{pc:#x}"),
                width = POINTER_FIELD_WIDTH,
            );
        }
        out
    }

    /// A stable 64-bit hash over exactly the live frames.
    pub fn hash_code(&self) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        for &frame in self.frames() {
            hasher.write_usize(frame);
        }
        hasher.finish()
    }

    #[cfg(test)]
    pub(crate) fn from_frames(frames: &[usize]) -> Self {
        let mut trace = Self::new();
        trace.frames[..frames.len()].copy_from_slice(frames);
        trace.num_frames = frames.len();
        trace
    }
}

impl Default for StackTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for StackTrace {
    fn eq(&self, other: &Self) -> bool {
        self.frames() == other.frames()
    }
}

impl Eq for StackTrace {}

impl Ord for StackTrace {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.frames().cmp(other.frames())
    }
}

impl PartialOrd for StackTrace {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for StackTrace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.frames().hash(state);
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StackTrace[{}]",
            self.to_hex_string_with(HexFormat {
                ox_prefix: true,
                keep_return_addresses: true,
            })
        )
    }
}

/// Records the current call chain into `frames`, returning how many frames
/// were stored and whether the anchor was encountered.
///
/// The walk starts inside the unwinding machinery itself, and the number of
/// machinery frames varies with inlining, so counting alone cannot find the
/// caller. When `anchor` is given (the address of `collect`), nothing is
/// recorded until the frame for that function goes by; `skip_frames` more
/// frames are then dropped before recording starts.
fn walk_frames(
    frames: &mut [usize; MAX_FRAMES],
    skip_frames: usize,
    anchor: Option<usize>,
) -> (usize, bool) {
    let mut num_frames = 0;
    let mut skip = skip_frames;
    let mut past_anchor = anchor.is_none();
    // SAFETY: the unsynchronized walk is what makes this callable from a
    // signal handler; the synchronized variant takes a lock. The callback
    // only writes into the fixed-size array.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if !past_anchor {
                if Some(frame.symbol_address() as usize) == anchor {
                    past_anchor = true;
                }
                return true;
            }
            if skip > 0 {
                skip -= 1;
                return true;
            }
            if num_frames == MAX_FRAMES {
                return false;
            }
            frames[num_frames] = frame.ip() as usize;
            num_frames += 1;
            true
        });
    }
    (num_frames, past_anchor)
}

static PRIME_UNWINDER: Once = Once::new();

/// Forces the unwinder's lazy one-time initialization in a benign context.
///
/// The first unwind on a process does double-checked locking inside the
/// unwinding runtime. If that first unwind happened inside a signal handler
/// that interrupted the initialization itself, the handler would deadlock
/// waiting on its own thread. Collectors call this on the requester thread
/// before any signal is sent; after initialization the `Once` fast path is a
/// single atomic load, which keeps `collect` callable from the handler.
pub(crate) fn prime_unwinder() {
    PRIME_UNWINDER.call_once(|| {
        // SAFETY: single frame step on the current thread, result discarded.
        unsafe {
            backtrace::trace_unsynchronized(|_| false);
        }
    });
}

/// Placeholder occupying a trace when unwinding had to be skipped; readers
/// see this function's name in symbolized output instead of an empty trace.
#[inline(never)]
pub(crate) extern "C" fn could_not_collect_stack_trace_because_inside_libdl() {}
