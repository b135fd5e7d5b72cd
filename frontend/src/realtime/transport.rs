use std::rc::Rc;

use crate::error::ScannerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

pub type EventHandler = Rc<dyn Fn(TransportEvent)>;

/// An open (or opening) socket.
pub trait TransportLink {
    fn send(&self, data: &str) -> Result<(), ScannerError>;
    /// Closes the socket without delivering further events.
    fn close(&self);
}

/// Opens text-frame sockets. Events arrive later through `on_event`.
pub trait Transport {
    fn open(&self, url: &str, on_event: EventHandler)
        -> Result<Box<dyn TransportLink>, ScannerError>;
}

pub use browser::WebSocketTransport;

mod browser {
    use super::*;
    use wasm_bindgen::{closure::Closure, JsCast};
    use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

    #[derive(Clone, Copy, Default)]
    pub struct WebSocketTransport;

    struct Callbacks {
        _on_open: Closure<dyn FnMut()>,
        _on_message: Closure<dyn FnMut(MessageEvent)>,
        _on_close: Closure<dyn FnMut(CloseEvent)>,
        _on_error: Closure<dyn FnMut(Event)>,
    }

    struct WebSocketLink {
        socket: WebSocket,
        callbacks: Option<Callbacks>,
    }

    impl Transport for WebSocketTransport {
        fn open(
            &self,
            url: &str,
            on_event: EventHandler,
        ) -> Result<Box<dyn TransportLink>, ScannerError> {
            let socket = WebSocket::new(url)
                .map_err(|e| ScannerError::network(format!("cannot open {}: {:?}", url, e)))?;

            let handler = on_event.clone();
            let on_open = Closure::<dyn FnMut()>::new(move || handler(TransportEvent::Opened));
            socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));

            let handler = on_event.clone();
            let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                match event.data().as_string() {
                    Some(text) => handler(TransportEvent::Message(text)),
                    None => log::warn!("ignoring non-text WebSocket message"),
                }
            });
            socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

            let handler = on_event.clone();
            let on_close = Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
                handler(TransportEvent::Closed {
                    code: event.code(),
                    reason: event.reason(),
                })
            });
            socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

            let handler = on_event;
            let on_error = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                handler(TransportEvent::Error("WebSocket error".into()))
            });
            socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            Ok(Box::new(WebSocketLink {
                socket,
                callbacks: Some(Callbacks {
                    _on_open: on_open,
                    _on_message: on_message,
                    _on_close: on_close,
                    _on_error: on_error,
                }),
            }))
        }
    }

    impl TransportLink for WebSocketLink {
        fn send(&self, data: &str) -> Result<(), ScannerError> {
            self.socket
                .send_with_str(data)
                .map_err(|e| ScannerError::network(format!("send failed: {:?}", e)))
        }

        fn close(&self) {
            self.socket.set_onopen(None);
            self.socket.set_onmessage(None);
            self.socket.set_onclose(None);
            self.socket.set_onerror(None);
            let _ = self.socket.close();
        }
    }

    impl Drop for WebSocketLink {
        fn drop(&mut self) {
            self.close();
            // The link may be dropped from inside one of its own callbacks;
            // release the closures once that callback has returned.
            if let Some(callbacks) = self.callbacks.take() {
                wasm_bindgen_futures::spawn_local(async move { drop(callbacks) });
            }
        }
    }
}
