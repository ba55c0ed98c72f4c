// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated controller lifecycle
//!
//! [`VirtualPlc`] owns the two tasks of the simulated controller: the Modbus
//! listener and the value generator. Both watch a shared `running` flag;
//! [`VirtualPlc::shutdown`] clears it and [`VirtualPlc::join`] waits for the
//! tasks to finish.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use crate::config::ControllerConfig;
use crate::modbus::ControllerModbusService;
use crate::simulation::{generator_rng, ControllerError, ProcessImage, SharedProcessImage};

/// Interval at which the listener task checks the running flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// A running simulated process controller.
pub struct VirtualPlc {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    image: SharedProcessImage,
    local_addr: SocketAddr,
}

impl VirtualPlc {
    /// Bind the Modbus listener and start the value generator.
    ///
    /// Port `0` binds an ephemeral port, see [`VirtualPlc::local_addr`].
    ///
    /// # Errors
    ///
    /// * [`ControllerError::Layout`] if the memory layout is invalid
    /// * [`ControllerError::Bind`] if the listening endpoint is unavailable
    pub async fn start(config: &ControllerConfig) -> Result<Self, ControllerError> {
        let image = Arc::new(Mutex::new(ProcessImage::from_config(config)?));

        let bind_addr = format!("{}:{}", config.address, config.port);
        let bind_error = |source| ControllerError::Bind {
            addr: bind_addr.clone(),
            source,
        };
        let listener = TcpListener::bind(bind_addr.as_str())
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let mut plc = Self {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            image,
            local_addr,
        };
        plc.start_modbus_server(listener);
        plc.start_generator(
            Duration::from_millis(config.tick_interval_ms),
            config.seed,
        );

        info!(
            "Simulated controller serving {} registers and {} coils on {}",
            config.registers.len(),
            config.coils.len(),
            local_addr
        );
        Ok(plc)
    }

    /// Start the Modbus listener task
    fn start_modbus_server(&mut self, listener: TcpListener) {
        let running = self.running.clone();
        let service = ControllerModbusService::new(self.image.clone(), self.running.clone());

        let task = tokio::spawn(async move {
            let server = Server::new(listener);

            let on_connected = move |stream, socket_addr| {
                let service = service.clone();
                async move {
                    accept_tcp_connection(stream, socket_addr, move |socket_addr| {
                        debug!("Accepted Modbus connection from {}", socket_addr);
                        Ok(Some(service.clone()))
                    })
                }
            };

            let on_process_error = |err| {
                error!("Modbus server error: {err}");
            };

            let server_handle = tokio::spawn(async move {
                if let Err(e) = server.serve(&on_connected, on_process_error).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) {
                time::sleep(SHUTDOWN_POLL).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();

            match time::timeout(Duration::from_secs(5), server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }

            Ok(())
        });

        self.tasks.push(task);
    }

    /// Start the value generator task
    fn start_generator(&mut self, period: Duration, seed: Option<u64>) {
        match seed {
            Some(seed) => info!("Starting value generator every {:?} with seed {}", period, seed),
            None => info!("Starting value generator every {:?}", period),
        }

        let running = self.running.clone();
        let image = self.image.clone();
        let task = tokio::spawn(async move {
            let mut rng = generator_rng(seed);
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately
            ticker.tick().await;

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let status = match image.lock() {
                    Ok(mut image) => {
                        image.tick(&mut rng);
                        (image.ticks() % 10 == 0)
                            .then(|| (image.ticks(), image.status_line()))
                    }
                    Err(_) => {
                        error!("Process image lock poisoned, stopping value generator");
                        anyhow::bail!("process image lock poisoned");
                    }
                };
                if let Some((ticks, line)) = status {
                    debug!("Generator tick {}: {}", ticks, line);
                }
            }

            debug!("Value generator stopped");
            Ok(())
        });

        self.tasks.push(task);
    }

    /// Address the Modbus listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Controller-side handle on the process image.
    pub fn image(&self) -> SharedProcessImage {
        self.image.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop all running tasks
    ///
    /// Requests still arriving on open connections are answered with
    /// `ServerDeviceFailure` from now on.
    pub fn shutdown(&self) {
        info!("Shutting down simulated controller");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for all tasks to complete
    ///
    /// Each task gets 5 seconds; a task that does not finish in time is
    /// logged and abandoned.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Controller task failed: {:#}", e),
                Ok(Err(e)) => error!("Controller task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }
        Ok(())
    }
}
