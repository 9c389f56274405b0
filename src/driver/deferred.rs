//! Deferred work between the interrupt top half and the worker.
//!
//! The top half never touches buffers of the normal flow. It pushes an
//! [`Event`] into a bounded queue and returns; the worker
//! ([`Csis::run_deferred`], or `Csis::run_worker` with the `async`
//! feature) pops and executes events one at a time.
//!
//! # Cancellation
//!
//! Stream stop first closes the queue, discarding what is queued, then
//! waits for the event in flight to finish. Only after that are channels torn down.

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;

use super::config::ChannelMode;
use super::csis::Csis;
use super::{dma, ring};
use crate::frame::{BufferStatus, CompletedFrame};
use crate::hal::{CsisHw, Pipeline};
use crate::internal::constants::{CHANNEL_COUNT, EVENT_QUEUE_DEPTH, WORKER_JOIN_POLL_US};
use crate::internal::diagnostics::{Diagnostics, should_log};
use crate::internal::fmt::{csis_debug, csis_warn};
#[cfg(feature = "async")]
use crate::sync::AtomicWaker;
use crate::sync::CriticalSectionCell;

/// Unit of deferred work scheduled by the top half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Accepted frame start, with the new frame counter
    FrameStart(u32),
    /// Accepted frame end, with the current frame counter
    FrameEnd(u32),
    /// DMA finished writing on a virtual channel
    DmaDone(usize),
}

// =============================================================================
// Event Queue
// =============================================================================

/// Fixed-capacity FIFO of pending events
pub(crate) struct EventQueue {
    events: [Option<Event>; EVENT_QUEUE_DEPTH],
    head: usize,
    len: usize,
    accepting: bool,
}

impl EventQueue {
    const fn new() -> Self {
        Self {
            events: [None; EVENT_QUEUE_DEPTH],
            head: 0,
            len: 0,
            accepting: false,
        }
    }

    fn push(&mut self, event: Event) -> bool {
        if self.len == EVENT_QUEUE_DEPTH {
            return false;
        }
        let tail = (self.head + self.len) % EVENT_QUEUE_DEPTH;
        self.events[tail] = Some(event);
        self.len += 1;
        true
    }

    fn pop(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }
        let event = self.events[self.head].take();
        self.head = (self.head + 1) % EVENT_QUEUE_DEPTH;
        self.len -= 1;
        event
    }

    fn clear(&mut self) {
        self.events = [None; EVENT_QUEUE_DEPTH];
        self.head = 0;
        self.len = 0;
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Queue plus in-flight bookkeeping for one receiver's deferred worker
pub(crate) struct Worker {
    queue: CriticalSectionCell<EventQueue>,
    in_flight: AtomicU32,
    #[cfg(feature = "async")]
    waker: AtomicWaker,
}

impl Worker {
    pub(crate) const fn new() -> Self {
        Self {
            queue: CriticalSectionCell::new(EventQueue::new()),
            in_flight: AtomicU32::new(0),
            #[cfg(feature = "async")]
            waker: AtomicWaker::new(),
        }
    }

    /// Open the queue for a new stream
    pub(crate) fn start(&self) {
        self.queue.with(|q| {
            q.clear();
            q.accepting = true;
        });
    }

    /// Queue `event` from the top half.
    ///
    /// Returns `false` when the worker is not accepting or the queue is full.
    /// Never blocks.
    pub(crate) fn schedule(&self, event: Event, diag: &Diagnostics) -> bool {
        let pushed = self.queue.with(|q| if q.accepting { Some(q.push(event)) } else { None });
        match pushed {
            None => false,
            Some(true) => {
                #[cfg(feature = "async")]
                self.waker.wake();
                true
            }
            Some(false) => {
                let dropped = Diagnostics::bump(&diag.dropped_events);
                if should_log(dropped) {
                    csis_warn!("deferred queue full, {} dropped", event);
                }
                false
            }
        }
    }

    /// Take the next event and mark it in flight
    pub(crate) fn pop(&self) -> Option<Event> {
        self.queue.with(|q| -> Option<Event> {
            let event = q.pop()?;
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            Some(event)
        })
    }

    /// Mark the event taken by [`pop`](Self::pop) as done
    pub(crate) fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Stop accepting events and discard the queued ones.
    ///
    /// Returns the number of discarded events.
    pub(crate) fn cancel(&self) -> usize {
        let discarded = self.queue.with(|q| {
            q.accepting = false;
            let len = q.len;
            q.clear();
            len
        });
        #[cfg(feature = "async")]
        self.waker.wake();
        discarded
    }

    /// Wait until no event is in flight
    pub(crate) fn join<D: DelayNs>(&self, delay: &mut D) {
        while self.in_flight.load(Ordering::Acquire) != 0 {
            delay.delay_us(WORKER_JOIN_POLL_US);
        }
    }

    /// Number of queued events
    pub(crate) fn pending(&self) -> usize {
        self.queue.with_ref(|q| q.len)
    }

    /// Whether events are being accepted
    #[cfg(test)]
    pub(crate) fn is_accepting(&self) -> bool {
        self.queue.with_ref(|q| q.accepting)
    }
}

// =============================================================================
// Worker Body
// =============================================================================

impl<H: CsisHw, P: Pipeline, const N: usize> Csis<'_, H, P, N> {
    /// Drain the deferred event queue.
    ///
    /// This is the body of the receiver's worker: call it from a thread or
    /// low-priority task after [`handle_interrupt`](Self::handle_interrupt)
    /// returned `true`. Events queued while draining are executed in the
    /// same call.
    ///
    /// Returns the number of events executed.
    pub fn run_deferred(&self) -> usize {
        let mut executed = 0;
        while let Some(event) = self.worker.pop() {
            self.execute(event);
            self.worker.finish();
            executed += 1;
        }
        executed
    }

    fn execute(&self, event: Event) {
        match event {
            Event::FrameStart(fcount) => {
                for vc in 0..CHANNEL_COUNT {
                    let bound =
                        self.with_channel(vc, |state, fm| self.frame_pass(vc, state, fm, fcount));
                    if bound.is_none() {
                        self.clear_errors(vc);
                    }
                }
                self.pipeline.on_frame_start(fcount);
            }
            Event::FrameEnd(fcount) => {
                let status = self.end_frame(fcount);
                self.pipeline.on_frame_end(None, status);
            }
            Event::DmaDone(vc) => {
                let completed = self.with_channel(vc, |state, fm| -> Option<Option<CompletedFrame>> {
                    if !state.is_active() {
                        return None;
                    }
                    match state.mode {
                        ChannelMode::Internal => {
                            if let Err(err) = ring::on_dma_done(&self.hw, vc, fm, &self.diag) {
                                self.fault_channel(vc, state, fm, err);
                            }
                            None
                        }
                        ChannelMode::External => match dma::complete_on_dma_done(&self.hw, vc, fm) {
                            Ok(done) => Some(done.map(|frame| CompletedFrame::from_frame(vc, &frame))),
                            Err(err) => {
                                self.fault_channel(vc, state, fm, err);
                                None
                            }
                        },
                    }
                });
                if let Some(done) = completed.flatten() {
                    csis_debug!("[VC{}] DMA done", vc);
                    let status = done.map_or(BufferStatus::Done, |frame| frame.status);
                    self.pipeline.on_frame_end(done, status);
                }
            }
        }
    }

    /// Run the deferred worker forever.
    ///
    /// Sleeps until the top half queues an event, then drains the queue with
    /// [`run_deferred`](Self::run_deferred).
    ///
    /// ```ignore
    /// #[embassy_executor::task]
    /// async fn csis_worker(csis: &'static Csis<'static, Hw, Isp, 8>) {
    ///     csis.run_worker().await
    /// }
    /// ```
    #[cfg(feature = "async")]
    pub async fn run_worker(&self) {
        loop {
            EventReady {
                worker: &self.worker,
            }
            .await;
            self.run_deferred();
        }
    }
}

// =============================================================================
// Async Wake-up
// =============================================================================

/// Future that resolves once the worker queue holds an event
#[cfg(feature = "async")]
pub(crate) struct EventReady<'w> {
    worker: &'w Worker,
}

#[cfg(feature = "async")]
impl core::future::Future for EventReady<'_> {
    type Output = ();

    fn poll(
        self: core::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Self::Output> {
        self.worker.waker.register(cx.waker());
        if self.worker.pending() > 0 {
            core::task::Poll::Ready(())
        } else {
            core::task::Poll::Pending
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDelay;

    #[test]
    fn queue_is_fifo_and_bounded() {
        let mut q = EventQueue::new();
        for n in 0..EVENT_QUEUE_DEPTH as u32 {
            assert!(q.push(Event::FrameStart(n)));
        }
        assert!(!q.push(Event::FrameEnd(0)));

        assert_eq!(q.pop(), Some(Event::FrameStart(0)));
        assert!(q.push(Event::DmaDone(3)));
        for n in 1..EVENT_QUEUE_DEPTH as u32 {
            assert_eq!(q.pop(), Some(Event::FrameStart(n)));
        }
        assert_eq!(q.pop(), Some(Event::DmaDone(3)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn schedule_requires_start() {
        let worker = Worker::new();
        let diag = Diagnostics::new();

        assert!(!worker.schedule(Event::FrameStart(1), &diag));
        assert_eq!(worker.pending(), 0);

        worker.start();
        assert!(worker.is_accepting());
        assert!(worker.schedule(Event::FrameStart(1), &diag));
        assert_eq!(worker.pending(), 1);
        assert_eq!(diag.snapshot().dropped_events, 0);
    }

    #[test]
    fn overflow_is_counted() {
        let worker = Worker::new();
        let diag = Diagnostics::new();
        worker.start();

        for n in 0..EVENT_QUEUE_DEPTH as u32 + 3 {
            worker.schedule(Event::FrameStart(n), &diag);
        }
        assert_eq!(worker.pending(), EVENT_QUEUE_DEPTH);
        assert_eq!(diag.snapshot().dropped_events, 3);
    }

    #[test]
    fn pop_tracks_in_flight() {
        let worker = Worker::new();
        let diag = Diagnostics::new();
        worker.start();
        worker.schedule(Event::DmaDone(0), &diag);

        assert_eq!(worker.pop(), Some(Event::DmaDone(0)));
        assert_eq!(worker.in_flight.load(Ordering::Relaxed), 1);
        worker.finish();
        assert_eq!(worker.in_flight.load(Ordering::Relaxed), 0);
        assert_eq!(worker.pop(), None);
        assert_eq!(worker.in_flight.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn cancel_discards_and_closes() {
        let worker = Worker::new();
        let diag = Diagnostics::new();
        worker.start();
        worker.schedule(Event::FrameStart(1), &diag);
        worker.schedule(Event::FrameEnd(1), &diag);

        assert_eq!(worker.cancel(), 2);
        assert_eq!(worker.pending(), 0);
        assert!(!worker.schedule(Event::FrameStart(2), &diag));
        assert_eq!(diag.snapshot().dropped_events, 0);
    }

    #[test]
    fn join_returns_immediately_when_idle() {
        let worker = Worker::new();
        let mut delay = MockDelay::new();
        worker.join(&mut delay);
        assert_eq!(delay.total_ns(), 0);
    }

    #[test]
    fn join_waits_for_in_flight_event() {
        extern crate std;
        use std::sync::atomic::AtomicBool;

        let worker = Worker::new();
        let diag = Diagnostics::new();
        let popped = AtomicBool::new(false);
        worker.start();
        worker.schedule(Event::FrameStart(1), &diag);

        std::thread::scope(|s| {
            s.spawn(|| {
                let event = worker.pop();
                popped.store(true, Ordering::Release);
                std::thread::sleep(std::time::Duration::from_millis(5));
                assert_eq!(event, Some(Event::FrameStart(1)));
                worker.finish();
            });

            while !popped.load(Ordering::Acquire) {
                std::thread::yield_now();
            }
            let mut delay = MockDelay::new();
            worker.join(&mut delay);
            assert_eq!(worker.in_flight.load(Ordering::Acquire), 0);
            assert!(delay.total_ns() > 0);
        });
    }

    #[cfg(feature = "async")]
    mod asynch {
        use core::future::Future;
        use core::pin::pin;
        use core::task::{Context, Poll, Waker};

        use super::*;

        #[test]
        fn event_ready_pends_until_queued() {
            let worker = Worker::new();
            let diag = Diagnostics::new();
            worker.start();

            let mut cx = Context::from_waker(Waker::noop());
            let mut ready = pin!(EventReady { worker: &worker });
            assert_eq!(ready.as_mut().poll(&mut cx), Poll::Pending);
            assert!(worker.waker.is_registered());

            worker.schedule(Event::FrameEnd(0), &diag);
            assert!(!worker.waker.is_registered());
            assert_eq!(ready.as_mut().poll(&mut cx), Poll::Ready(()));
        }
    }
}
