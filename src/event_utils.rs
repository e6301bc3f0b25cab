use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use web_sys::{AddEventListenerOptions, Event, EventTarget};

use crate::domain::logging::{LogComponent, get_logger};

#[derive(Clone, Debug)]
pub struct EventOptions {
    pub passive: bool,
    pub capture: bool,
    pub once: bool,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self { passive: true, capture: false, once: false }
    }
}

impl EventOptions {
    pub fn once() -> Self {
        Self { once: true, ..Self::default() }
    }
}

/// Registered listener; removed from its target on `remove` or drop.
pub struct EventListenerHandle {
    target: EventTarget,
    event_name: String,
    callback: Option<Closure<dyn FnMut(Event)>>,
    capture: bool,
}

impl EventListenerHandle {
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn remove(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(callback) = self.callback.take() {
            if let Err(e) = self.target.remove_event_listener_with_callback_and_bool(
                &self.event_name,
                callback.as_ref().unchecked_ref(),
                self.capture,
            ) {
                get_logger().debug(
                    LogComponent::Presentation("EventUtils"),
                    &format!("Failed to remove `{}` listener: {e:?}", self.event_name),
                );
            }
        }
    }
}

impl Drop for EventListenerHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Attach `cb` to `target`, casting each event to `E`.
pub fn listen_with_options<E>(
    target: &EventTarget,
    event_name: &str,
    options: &EventOptions,
    mut cb: impl FnMut(E) + 'static,
) -> EventListenerHandle
where
    E: JsCast + 'static,
{
    let opts = AddEventListenerOptions::new();
    opts.set_passive(options.passive);
    opts.set_capture(options.capture);
    opts.set_once(options.once);

    let callback = Closure::wrap(Box::new(move |ev: Event| {
        cb(ev.unchecked_into::<E>());
    }) as Box<dyn FnMut(Event)>);

    if let Err(e) = target.add_event_listener_with_callback_and_add_event_listener_options(
        event_name,
        callback.as_ref().unchecked_ref(),
        &opts,
    ) {
        get_logger().debug(
            LogComponent::Presentation("EventUtils"),
            &format!("Failed to add `{event_name}` listener: {e:?}"),
        );
    }

    EventListenerHandle {
        target: target.clone(),
        event_name: event_name.to_string(),
        callback: Some(callback),
        capture: options.capture,
    }
}

pub fn listen<E>(target: &EventTarget, event_name: &str, cb: impl FnMut(E) + 'static) -> EventListenerHandle
where
    E: JsCast + 'static,
{
    listen_with_options(target, event_name, &EventOptions::default(), cb)
}

/// Window-level listener, e.g. `pagehide`. `None` outside a browser window.
pub fn window_event_listener<E>(event_name: &str, cb: impl FnMut(E) + 'static) -> Option<EventListenerHandle>
where
    E: JsCast + 'static,
{
    let window = web_sys::window()?;
    Some(listen(window.as_ref(), event_name, cb))
}
