use std::fmt;

use super::ChunkColumn;

/// A one-shot notification. It runs at most once and is dropped afterwards.
pub type ChunkCallback = Box<dyn FnOnce(&ChunkColumn) + Send + Sync>;

/// Identifies a registered callback so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

#[derive(Default)]
pub(crate) struct Callbacks {
    next_id: u64,
    after_parse: Option<(CallbackHandle, ChunkCallback)>,
    on_unload: Option<(CallbackHandle, ChunkCallback)>,
}

impl Callbacks {
    fn next_handle(&mut self) -> CallbackHandle {
        self.next_id += 1;
        CallbackHandle(self.next_id)
    }

    pub(crate) fn set_after_parse(&mut self, callback: ChunkCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.after_parse = Some((handle, callback));
        handle
    }

    pub(crate) fn set_on_unload(&mut self, callback: ChunkCallback) -> CallbackHandle {
        let handle = self.next_handle();
        self.on_unload = Some((handle, callback));
        handle
    }

    pub(crate) fn take_after_parse(&mut self) -> Option<ChunkCallback> {
        self.after_parse.take().map(|(_, callback)| callback)
    }

    pub(crate) fn take_on_unload(&mut self) -> Option<ChunkCallback> {
        self.on_unload.take().map(|(_, callback)| callback)
    }

    pub(crate) fn cancel(&mut self, handle: CallbackHandle) -> bool {
        for slot in [&mut self.after_parse, &mut self.on_unload] {
            if slot.as_ref().is_some_and(|(registered, _)| *registered == handle) {
                *slot = None;
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("after_parse", &self.after_parse.as_ref().map(|(handle, _)| handle))
            .field("on_unload", &self.on_unload.as_ref().map(|(handle, _)| handle))
            .finish()
    }
}
