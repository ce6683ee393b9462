//! Chunk assembler: rebuild a proxied HTTP response from strictly ordered chunks.

use tracing::{debug, info, warn};

use crate::state::{ProxyResponseChunk, PROXY_CHUNK_DATA_BYTES};

/// Default cap on a reassembled response body.
pub const DEFAULT_MAX_ASSEMBLED_BYTES: usize = 1024;

/// In-progress response: which request, how many chunks, what comes next.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Assembly {
    request_id: u16,
    total: u16,
    next_index: u16,
    buffer: Vec<u8>,
}

impl Assembly {
    fn start(request_id: u16, total: u16) -> Self {
        Self {
            request_id,
            total,
            next_index: 1,
            buffer: Vec::new(),
        }
    }

    fn expects(&self, chunk: &ProxyResponseChunk) -> bool {
        chunk.request_id == self.request_id
            && chunk.total == self.total
            && chunk.index == self.next_index
    }
}

/// A fully reassembled response with the status carried by its last chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedResponse {
    pub request_id: u16,
    pub chunks: u16,
    pub ok: u8,
    pub status_code: i16,
    pub body: Vec<u8>,
}

/// Result of feeding one chunk to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkReceiveResult {
    /// Last chunk accepted; assembly cleared.
    Complete(CompletedResponse),
    /// Chunk appended; more expected.
    InProgress,
    /// Index/total/length fields are impossible; nothing changed.
    InvalidFields,
    /// Not the chunk the assembly expects; dropped.
    OutOfOrder { expected: u16 },
    /// Appending would exceed the cap; assembly discarded.
    Overflow,
}

/// Owns the single in-flight assembly. Only one response is rebuilt at a time.
#[derive(Debug)]
pub struct ChunkAssembler {
    current: Option<Assembly>,
    max_bytes: usize,
}

impl ChunkAssembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            current: None,
            max_bytes,
        }
    }

    /// `(request_id, next_index)` of the in-flight assembly, if any.
    pub fn in_progress(&self) -> Option<(u16, u16)> {
        self.current.as_ref().map(|a| (a.request_id, a.next_index))
    }

    pub fn buffered_len(&self) -> usize {
        self.current.as_ref().map_or(0, |a| a.buffer.len())
    }

    /// Feed one chunk.
    ///
    /// Index 1, or a request id different from the current one, starts a fresh
    /// assembly. After that the chunk must match id, total and next index
    /// exactly or it is dropped without touching the assembly.
    pub fn on_chunk(&mut self, chunk: &ProxyResponseChunk) -> ChunkReceiveResult {
        if chunk.index == 0
            || chunk.total == 0
            || chunk.index > chunk.total
            || chunk.data.len() > PROXY_CHUNK_DATA_BYTES
        {
            warn!(
                request_id = chunk.request_id,
                index = chunk.index,
                total = chunk.total,
                "invalid proxy chunk fields"
            );
            return ChunkReceiveResult::InvalidFields;
        }

        let restart = match &self.current {
            Some(a) => chunk.index == 1 || chunk.request_id != a.request_id,
            None => true,
        };
        if restart {
            if let Some(old) = &self.current {
                if old.next_index > 1 {
                    debug!(
                        request_id = old.request_id,
                        next = old.next_index,
                        "abandoning partial assembly"
                    );
                }
            }
            self.current = Some(Assembly::start(chunk.request_id, chunk.total));
        }

        let Some(assembly) = self.current.as_mut() else {
            return ChunkReceiveResult::InvalidFields;
        };
        if !assembly.expects(chunk) {
            warn!(
                request_id = chunk.request_id,
                index = chunk.index,
                expected = assembly.next_index,
                "out-of-order chunk"
            );
            return ChunkReceiveResult::OutOfOrder {
                expected: assembly.next_index,
            };
        }

        if assembly.buffer.len() + chunk.data.len() > self.max_bytes {
            warn!(
                request_id = chunk.request_id,
                max = self.max_bytes,
                "chunk assembly overflow, reset"
            );
            self.current = None;
            return ChunkReceiveResult::Overflow;
        }

        assembly.buffer.extend_from_slice(&chunk.data);
        assembly.next_index += 1;

        if chunk.index < chunk.total {
            return ChunkReceiveResult::InProgress;
        }

        let done = self.current.take().map(|a| a.buffer).unwrap_or_default();
        info!(chunks = chunk.total, bytes = done.len(), "chunk assemble complete");
        ChunkReceiveResult::Complete(CompletedResponse {
            request_id: chunk.request_id,
            chunks: chunk.total,
            ok: chunk.ok,
            status_code: chunk.status_code,
            body: done,
        })
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ASSEMBLED_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(request_id: u16, index: u16, total: u16, data: &[u8]) -> ProxyResponseChunk {
        ProxyResponseChunk {
            request_id,
            index,
            total,
            ok: 1,
            status_code: 200,
            data: data.to_vec(),
        }
    }

    #[test]
    fn in_order_chunks_complete_once() {
        let mut asm = ChunkAssembler::default();
        let parts: [&[u8]; 3] = [b"abc", b"def", b"gh"];
        let mut completions = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            match asm.on_chunk(&chunk(9, i as u16 + 1, 3, part)) {
                ChunkReceiveResult::Complete(done) => completions.push(done),
                ChunkReceiveResult::InProgress => {}
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].body, b"abcdefgh");
        assert_eq!(completions[0].request_id, 9);
        assert_eq!(completions[0].chunks, 3);
        assert_eq!(completions[0].status_code, 200);
        assert_eq!(asm.in_progress(), None);
    }

    #[test]
    fn single_chunk_response() {
        let mut asm = ChunkAssembler::default();
        let r = asm.on_chunk(&chunk(1, 1, 1, b"{}"));
        assert!(matches!(r, ChunkReceiveResult::Complete(ref d) if d.body == b"{}"));
    }

    #[test]
    fn invalid_fields_leave_state_alone() {
        let mut asm = ChunkAssembler::default();
        asm.on_chunk(&chunk(4, 1, 3, b"a"));
        assert_eq!(
            asm.on_chunk(&chunk(4, 0, 3, b"b")),
            ChunkReceiveResult::InvalidFields
        );
        assert_eq!(
            asm.on_chunk(&chunk(4, 2, 0, b"b")),
            ChunkReceiveResult::InvalidFields
        );
        assert_eq!(
            asm.on_chunk(&chunk(4, 4, 3, b"b")),
            ChunkReceiveResult::InvalidFields
        );
        assert_eq!(asm.in_progress(), Some((4, 2)));
        assert_eq!(asm.buffered_len(), 1);
    }

    #[test]
    fn out_of_order_dropped_without_change() {
        let mut asm = ChunkAssembler::default();
        asm.on_chunk(&chunk(5, 1, 4, b"one"));
        asm.on_chunk(&chunk(5, 2, 4, b"two"));
        let before = (asm.in_progress(), asm.buffered_len());

        assert_eq!(
            asm.on_chunk(&chunk(5, 4, 4, b"four")),
            ChunkReceiveResult::OutOfOrder { expected: 3 }
        );
        // Duplicate of an already accepted chunk.
        assert_eq!(
            asm.on_chunk(&chunk(5, 2, 4, b"two")),
            ChunkReceiveResult::OutOfOrder { expected: 3 }
        );
        // Same id, different total.
        assert_eq!(
            asm.on_chunk(&chunk(5, 3, 5, b"three")),
            ChunkReceiveResult::OutOfOrder { expected: 3 }
        );
        assert_eq!((asm.in_progress(), asm.buffered_len()), before);

        asm.on_chunk(&chunk(5, 3, 4, b"three"));
        let r = asm.on_chunk(&chunk(5, 4, 4, b"four"));
        assert!(matches!(r, ChunkReceiveResult::Complete(ref d) if d.body == b"onetwothreefour"));
    }

    #[test]
    fn stream_missing_first_chunk_never_completes() {
        let mut asm = ChunkAssembler::default();
        assert_eq!(
            asm.on_chunk(&chunk(7, 2, 2, b"tail")),
            ChunkReceiveResult::OutOfOrder { expected: 1 }
        );
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn index_one_restarts_same_request() {
        let mut asm = ChunkAssembler::default();
        asm.on_chunk(&chunk(3, 1, 2, b"stale"));
        asm.on_chunk(&chunk(3, 1, 2, b"fresh"));
        let r = asm.on_chunk(&chunk(3, 2, 2, b"!"));
        assert!(matches!(r, ChunkReceiveResult::Complete(ref d) if d.body == b"fresh!"));
    }

    #[test]
    fn new_request_id_replaces_partial_assembly() {
        let mut asm = ChunkAssembler::default();
        asm.on_chunk(&chunk(1, 1, 3, b"old"));
        asm.on_chunk(&chunk(2, 1, 2, b"new"));
        assert_eq!(asm.in_progress(), Some((2, 2)));
        let r = asm.on_chunk(&chunk(2, 2, 2, b"er"));
        assert!(matches!(r, ChunkReceiveResult::Complete(ref d) if d.body == b"newer"));
    }

    #[test]
    fn overflow_discards_assembly() {
        let mut asm = ChunkAssembler::new(8);
        assert_eq!(
            asm.on_chunk(&chunk(6, 1, 3, b"12345")),
            ChunkReceiveResult::InProgress
        );
        assert_eq!(
            asm.on_chunk(&chunk(6, 2, 3, b"6789")),
            ChunkReceiveResult::Overflow
        );
        assert_eq!(asm.in_progress(), None);
        assert_eq!(
            asm.on_chunk(&chunk(6, 3, 3, b"x")),
            ChunkReceiveResult::OutOfOrder { expected: 1 }
        );

        assert_eq!(
            asm.on_chunk(&chunk(6, 1, 2, b"1234")),
            ChunkReceiveResult::InProgress
        );
        let r = asm.on_chunk(&chunk(6, 2, 2, b"5678"));
        assert!(matches!(r, ChunkReceiveResult::Complete(ref d) if d.body == b"12345678"));
    }
}
