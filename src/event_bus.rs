use crate::events::*;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;

/// The type of a registered event handler. Handlers run on the event bus thread, off the commit
/// path.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) execute_block_handlers: Vec<HandlerPtr<ExecuteBlockEvent>>,
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,
    pub(crate) flush_header_index_handlers: Vec<HandlerPtr<FlushHeaderIndexEvent>>,
    pub(crate) submit_failure_handlers: Vec<HandlerPtr<SubmitFailureEvent>>,
}

impl EventHandlers {
    pub(crate) fn is_empty(&self) -> bool {
        self.execute_block_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.flush_header_index_handlers.is_empty()
            && self.submit_failure_handlers.is_empty()
    }

    pub fn fire_handlers(&self, event: Event) {
        match event {
            Event::ExecuteBlock(execute_block_event) => self
                .execute_block_handlers
                .iter()
                .for_each(|handler| handler(&execute_block_event)),

            Event::CommitBlock(commit_block_event) => self
                .commit_block_handlers
                .iter()
                .for_each(|handler| handler(&commit_block_event)),

            Event::FlushHeaderIndex(flush_header_index_event) => self
                .flush_header_index_handlers
                .iter()
                .for_each(|handler| handler(&flush_header_index_event)),

            Event::SubmitFailure(submit_failure_event) => self
                .submit_failure_handlers
                .iter()
                .for_each(|handler| handler(&submit_failure_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => (&event_handlers).fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => return,
        }
    })
}
