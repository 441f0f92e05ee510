//! Watch handles and the `Watchable` trait
//!
//! A watch handle answers one question, "has this value been released?",
//! without keeping the value alive. `Watchable` decides which handles a
//! value contributes: containers recurse into their elements, `Arc`s
//! contribute a weak observation of themselves.

use crate::channel::{DisposalChannel, DisposeProbe, ProbeState};
use std::any::type_name;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use testkit_core::PendingValue;

/// Observation of one watched value.
pub trait WatchHandle: Send + Sync {
    /// True once the value can no longer be reached
    fn is_released(&self) -> bool;

    /// Best-effort description for leak reports
    fn describe(&self) -> PendingValue;
}

struct WeakHandle<T: ?Sized> {
    weak: Weak<T>,
}

impl<T> WatchHandle for WeakHandle<T>
where
    T: ?Sized + Debug + Send + Sync + 'static,
{
    fn is_released(&self) -> bool {
        self.weak.strong_count() == 0
    }

    fn describe(&self) -> PendingValue {
        match self.weak.upgrade() {
            Some(value) => PendingValue::new(Some(type_name::<T>().to_string()), format!("{:?}", value)),
            None => PendingValue::new(None, "null"),
        }
    }
}

struct ProbeHandle {
    state: Arc<ProbeState>,
}

impl WatchHandle for ProbeHandle {
    fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    fn describe(&self) -> PendingValue {
        PendingValue::new(
            Some(type_name::<DisposeProbe>().to_string()),
            format!("DisposeProbe({:?})", self.state.label),
        )
    }
}

/// Collects handles for the region currently open.
///
/// `Watchable` implementations must only use the sink; calling back into the
/// verifier from `watch_into` deadlocks.
pub struct WatchSink<'a> {
    handles: &'a mut Vec<Box<dyn WatchHandle>>,
    channel: &'a Arc<DisposalChannel>,
}

impl<'a> WatchSink<'a> {
    pub(crate) fn new(
        handles: &'a mut Vec<Box<dyn WatchHandle>>,
        channel: &'a Arc<DisposalChannel>,
    ) -> Self {
        WatchSink { handles, channel }
    }

    /// Watch a value and everything it contains
    pub fn watch<W: Watchable + ?Sized>(&mut self, value: &W) {
        value.watch_into(self);
    }

    /// Observe an `Arc` weakly, without looking inside it
    pub fn observe<T>(&mut self, value: &Arc<T>)
    where
        T: ?Sized + Debug + Send + Sync + 'static,
    {
        self.handles.push(Box::new(WeakHandle {
            weak: Arc::downgrade(value),
        }));
    }

    /// Watch an `Arc`'s contents, then the `Arc` itself
    pub fn observe_deep<T>(&mut self, value: &Arc<T>)
    where
        T: ?Sized + Watchable + Debug + Send + Sync + 'static,
    {
        self.watch(value.as_ref());
        self.observe(value);
    }

    /// Watch a disposal probe; its drop wakes the draining loop directly
    pub fn probe(&mut self, probe: &DisposeProbe) {
        let state = probe.state();
        state.subscribe(self.channel);
        self.handles.push(Box::new(ProbeHandle {
            state: Arc::clone(state),
        }));
    }

    /// Register a custom handle
    pub fn push_handle(&mut self, handle: Box<dyn WatchHandle>) {
        self.handles.push(handle);
    }
}

/// Values a leak region can watch.
pub trait Watchable {
    /// Register this value's handles (and its elements') with the sink
    fn watch_into(&self, sink: &mut WatchSink<'_>);
}

/// Watch an `Arc`'s contents as well as the `Arc` itself.
#[derive(Debug, Clone)]
pub struct Deep<T: ?Sized>(pub Arc<T>);

impl<T> Watchable for Deep<T>
where
    T: ?Sized + Watchable + Debug + Send + Sync + 'static,
{
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        sink.observe_deep(&self.0);
    }
}

impl<T> Watchable for Arc<T>
where
    T: ?Sized + Debug + Send + Sync + 'static,
{
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        sink.observe(self);
    }
}

impl Watchable for DisposeProbe {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        sink.probe(self);
    }
}

impl<W: Watchable + ?Sized> Watchable for &W {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        (**self).watch_into(sink);
    }
}

impl<W: Watchable + ?Sized> Watchable for Box<W> {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        (**self).watch_into(sink);
    }
}

impl<W: Watchable> Watchable for Option<W> {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        if let Some(value) = self {
            value.watch_into(sink);
        }
    }
}

impl<W: Watchable> Watchable for [W] {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        for element in self {
            element.watch_into(sink);
        }
    }
}

impl<W: Watchable, const N: usize> Watchable for [W; N] {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        self.as_slice().watch_into(sink);
    }
}

impl<W: Watchable> Watchable for Vec<W> {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        self.as_slice().watch_into(sink);
    }
}

impl<W: Watchable> Watchable for VecDeque<W> {
    fn watch_into(&self, sink: &mut WatchSink<'_>) {
        for element in self {
            element.watch_into(sink);
        }
    }
}

macro_rules! watchable_tuple {
    ($($name:ident),*) => {
        impl<$($name: Watchable),*> Watchable for ($($name,)*) {
            #[allow(non_snake_case, unused_variables)]
            fn watch_into(&self, sink: &mut WatchSink<'_>) {
                let ($($name,)*) = self;
                $($name.watch_into(sink);)*
            }
        }
    };
}

watchable_tuple!();
watchable_tuple!(A);
watchable_tuple!(A, B);
watchable_tuple!(A, B, C);
watchable_tuple!(A, B, C, D);
watchable_tuple!(A, B, C, D, E);
watchable_tuple!(A, B, C, D, E, F);
