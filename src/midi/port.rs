use crossbeam_channel as channel;
use std::{sync::Arc, thread};

use super::{io, Error, RawKind};
use crate::transport::{InputDevice, RawHandler, RawHandlers, Transport};

/// Input devices seen through midir.
#[derive(Debug)]
pub struct MidirTransport {
    client_name: Arc<str>,
}

impl MidirTransport {
    pub fn try_new(client_name: impl Into<Arc<str>>) -> Result<Self, Error> {
        let client_name = client_name.into();

        // Fail early if the MIDI backend is unavailable.
        midir::MidiInput::new(&client_name)?;

        Ok(Self { client_name })
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }
}

impl Transport for MidirTransport {
    type Device = MidirDevice;

    fn input_devices(&self) -> Result<Vec<MidirDevice>, Error> {
        let temp_conn = midir::MidiInput::new(&format!("{} refresh In ports", self.client_name))?;

        let mut devices = Vec::new();
        for port in temp_conn.ports().iter() {
            let name = temp_conn.port_name(port)?;
            // Skip our own ports
            if name.starts_with(self.client_name.as_ref()) {
                continue;
            }

            devices.push(MidirDevice {
                name: name.into(),
                port: port.clone(),
                client_name: self.client_name.clone(),
                handlers: RawHandlers::default(),
                worker: None,
                is_receiving: false,
            });
        }

        Ok(devices)
    }
}

enum Request {
    StartReceiving(channel::Sender<Result<(), Error>>),
    StopReceiving(channel::Sender<()>),
}

/// Thread owning the midir client while the device is open.
struct Worker {
    req_tx: channel::Sender<Request>,
    handle: thread::JoinHandle<()>,
}

pub struct MidirDevice {
    name: Arc<str>,
    port: midir::MidiInputPort,
    client_name: Arc<str>,
    handlers: RawHandlers,
    worker: Option<Worker>,
    is_receiving: bool,
}

impl MidirDevice {
    fn spawn_worker(&self) -> Result<Worker, Error> {
        let (req_tx, req_rx) = channel::unbounded::<Request>();
        let (init_tx, init_rx) = channel::bounded(1);

        let name = self.name.clone();
        let port = self.port.clone();
        let client_name = self.client_name.clone();
        let handlers = self.handlers.clone();

        let handle = thread::Builder::new()
            .name(format!("MIDI In {}", self.name))
            .spawn(move || {
                let mut conn = io::InputConnection::default();
                if let Err(err) = conn.open(&client_name, handlers) {
                    let _ = init_tx.send(Err(err));
                    return;
                }
                let _ = init_tx.send(Ok(()));

                for req in req_rx.iter() {
                    use Request::*;
                    match req {
                        StartReceiving(resp_tx) => {
                            let res = conn.connect(name.clone(), &port, &client_name);
                            let _ = resp_tx.send(res);
                        }
                        StopReceiving(resp_tx) => {
                            conn.disconnect();
                            let _ = resp_tx.send(());
                        }
                    }
                }

                conn.close();
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => Ok(Worker { req_tx, handle }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Connection(self.name.clone()))
            }
        }
    }
}

impl InputDevice for MidirDevice {
    fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    fn open(&mut self) -> Result<(), Error> {
        if self.worker.is_none() {
            self.worker = Some(self.spawn_worker()?);
            log::debug!("Opened Input {}", self.name);
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    fn close(&mut self) {
        if let Some(Worker { req_tx, handle }) = self.worker.take() {
            // Dropping the requests channel ends the worker loop.
            drop(req_tx);
            if handle.join().is_err() {
                log::error!("MIDI In worker for {} panicked", self.name);
            }

            log::debug!("Closed Input {}", self.name);
        }

        self.is_receiving = false;
    }

    fn start_receiving(&mut self) -> Result<(), Error> {
        if self.is_receiving {
            return Ok(());
        }

        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| Error::NotOpen(self.name.clone()))?;

        let (resp_tx, resp_rx) = channel::bounded(1);
        worker
            .req_tx
            .send(Request::StartReceiving(resp_tx))
            .map_err(|_| Error::Connection(self.name.clone()))?;
        resp_rx
            .recv()
            .map_err(|_| Error::Connection(self.name.clone()))??;

        log::info!("Receiving from {}", self.name);
        self.is_receiving = true;

        Ok(())
    }

    fn is_receiving(&self) -> bool {
        self.is_receiving
    }

    fn stop_receiving(&mut self) {
        if !self.is_receiving {
            return;
        }
        self.is_receiving = false;

        if let Some(worker) = self.worker.as_ref() {
            let (resp_tx, resp_rx) = channel::bounded(1);
            if worker.req_tx.send(Request::StopReceiving(resp_tx)).is_ok() {
                let _ = resp_rx.recv();
            }
        }

        log::debug!("Stopped receiving from {}", self.name);
    }

    fn add_handler(&mut self, kind: RawKind, handler: RawHandler) {
        self.handlers.add(kind, handler);
    }

    fn remove_all_handlers(&mut self) {
        self.handlers.clear();
    }
}

impl Drop for MidirDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MidirDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidirDevice")
            .field("name", &self.name)
            .field("is_open", &self.is_open())
            .field("is_receiving", &self.is_receiving)
            .finish()
    }
}
