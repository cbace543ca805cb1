use std::rc::Rc;

use crate::DisposableAction;

/// An event source that listeners can be registered with and removed from.
///
/// Implement this for an existing event source to manage its subscriptions as disposables with
/// [`subscribe()`] and [`subscribe_once()`].
pub trait EventEmitter {
    /// Identifies a kind of event.
    type Event: Clone + 'static;

    /// A registered callback. Removal matches listeners by whatever identity this type carries.
    type Listener: Clone + 'static;

    /// Registers `listener` for every occurrence of `event`.
    fn on(&self, event: Self::Event, listener: Self::Listener);

    /// Registers `listener` for the next occurrence of `event` only.
    fn once(&self, event: Self::Event, listener: Self::Listener);

    /// Removes `listener` from `event`. Removing a listener that is not registered does nothing.
    fn off(&self, event: &Self::Event, listener: &Self::Listener);
}

/// Registers `listener` for `event` and returns a disposable that removes it again.
///
/// The subscription does not keep the emitter alive. Disposing it after the emitter has been
/// dropped does nothing.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use disposables::{Disposable, EventEmitter, subscribe};
///
/// #[derive(Default)]
/// struct Button {
///     clicks: RefCell<Vec<Rc<dyn Fn()>>>,
/// }
///
/// impl EventEmitter for Button {
///     type Event = &'static str;
///     type Listener = Rc<dyn Fn()>;
///
///     fn on(&self, _event: &'static str, listener: Rc<dyn Fn()>) {
///         self.clicks.borrow_mut().push(listener);
///     }
///
///     fn once(&self, event: &'static str, listener: Rc<dyn Fn()>) {
///         self.on(event, listener);
///     }
///
///     fn off(&self, _event: &&'static str, listener: &Rc<dyn Fn()>) {
///         self.clicks.borrow_mut().retain(|l| !Rc::ptr_eq(l, listener));
///     }
/// }
///
/// let button = Rc::new(Button::default());
/// let listener: Rc<dyn Fn()> = Rc::new(|| println!("clicked"));
/// let subscription = subscribe(&button, "click", listener);
/// assert_eq!(button.clicks.borrow().len(), 1);
///
/// subscription.dispose()?;
/// assert!(button.clicks.borrow().is_empty());
/// # Ok::<(), disposables::Error>(())
/// ```
pub fn subscribe<E: EventEmitter + 'static>(
    emitter: &Rc<E>,
    event: E::Event,
    listener: E::Listener,
) -> Rc<DisposableAction> {
    emitter.on(event.clone(), listener.clone());
    unsubscriber(emitter, event, listener)
}

/// Registers `listener` for the next occurrence of `event` and returns a disposable that removes
/// it again if it has not fired yet.
pub fn subscribe_once<E: EventEmitter + 'static>(
    emitter: &Rc<E>,
    event: E::Event,
    listener: E::Listener,
) -> Rc<DisposableAction> {
    emitter.once(event.clone(), listener.clone());
    unsubscriber(emitter, event, listener)
}

fn unsubscriber<E: EventEmitter + 'static>(
    emitter: &Rc<E>,
    event: E::Event,
    listener: E::Listener,
) -> Rc<DisposableAction> {
    let emitter = Rc::downgrade(emitter);

    Rc::new(DisposableAction::new(move || {
        if let Some(emitter) = emitter.upgrade() {
            emitter.off(&event, &listener);
        }
    }))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::{Disposable, DisposableStore};

    type Listener = Rc<dyn Fn(u32)>;

    struct Registration {
        event: String,
        listener: Listener,
        once: bool,
    }

    #[derive(Default)]
    struct TestEmitter {
        registrations: RefCell<Vec<Registration>>,
        offs: Cell<usize>,
    }

    impl TestEmitter {
        fn emit(&self, event: &str, value: u32) {
            let fired: Vec<Listener> = {
                let mut registrations = self.registrations.borrow_mut();

                let fired = registrations
                    .iter()
                    .filter(|r| r.event == event)
                    .map(|r| Rc::clone(&r.listener))
                    .collect();

                registrations.retain(|r| !(r.once && r.event == event));
                fired
            };

            for listener in fired {
                listener(value);
            }
        }

        fn count(&self) -> usize {
            self.registrations.borrow().len()
        }
    }

    impl EventEmitter for TestEmitter {
        type Event = String;
        type Listener = Listener;

        fn on(&self, event: String, listener: Listener) {
            self.registrations.borrow_mut().push(Registration {
                event,
                listener,
                once: false,
            });
        }

        fn once(&self, event: String, listener: Listener) {
            self.registrations.borrow_mut().push(Registration {
                event,
                listener,
                once: true,
            });
        }

        fn off(&self, event: &String, listener: &Listener) {
            self.offs.set(self.offs.get() + 1);
            self.registrations
                .borrow_mut()
                .retain(|r| !(r.event == *event && Rc::ptr_eq(&r.listener, listener)));
        }
    }

    fn recording_listener() -> (Listener, Rc<RefCell<Vec<u32>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));

        let listener: Listener = {
            let seen = Rc::clone(&seen);
            Rc::new(move |value: u32| seen.borrow_mut().push(value))
        };

        (listener, seen)
    }

    #[test]
    fn subscription_removes_listener_once() {
        let emitter = Rc::new(TestEmitter::default());
        let (listener, seen) = recording_listener();

        let subscription = subscribe(&emitter, "tick".to_owned(), listener);
        emitter.emit("tick", 1);

        subscription.dispose().unwrap();
        subscription.dispose().unwrap();
        emitter.emit("tick", 2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(emitter.offs.get(), 1);
        assert_eq!(emitter.count(), 0);
    }

    #[test]
    fn once_subscription_fires_once() {
        let emitter = Rc::new(TestEmitter::default());
        let (listener, seen) = recording_listener();

        let subscription = subscribe_once(&emitter, "tick".to_owned(), listener);
        emitter.emit("tick", 1);
        emitter.emit("tick", 2);

        assert_eq!(*seen.borrow(), vec![1]);

        // Removing a listener that already fired is harmless.
        subscription.dispose().unwrap();
    }

    #[test]
    fn subscription_does_not_keep_emitter_alive() {
        let emitter = Rc::new(TestEmitter::default());
        let (listener, _) = recording_listener();

        let subscription = subscribe(&emitter, "tick".to_owned(), listener);
        assert_eq!(Rc::strong_count(&emitter), 1);

        drop(emitter);
        subscription.dispose().unwrap();
    }

    #[test]
    fn subscriptions_in_store() {
        let emitter = Rc::new(TestEmitter::default());
        let store = DisposableStore::new();

        for event in ["a", "b"] {
            let (listener, _) = recording_listener();
            store
                .add(subscribe(&emitter, event.to_owned(), listener))
                .unwrap();
        }

        assert_eq!(emitter.count(), 2);

        store.dispose().unwrap();
        assert_eq!(emitter.count(), 0);
    }
}
