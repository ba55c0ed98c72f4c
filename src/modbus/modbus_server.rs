// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the scada-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server implementation for the simulated process controller
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! ## Supported function codes
//!
//! | Code | Request | Space |
//! |------|---------|-------|
//! | 0x01 | Read Coils | coils |
//! | 0x03 | Read Holding Registers | holding registers |
//! | 0x05 | Write Single Coil | coils |
//! | 0x06 | Write Single Register | holding registers |
//! | 0x0F | Write Multiple Coils | coils |
//! | 0x10 | Write Multiple Registers | holding registers |
//!
//! Any other request is answered with `IllegalFunction`.

use std::{
    future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use log::{debug, error};
use tokio_modbus::prelude::*;

use crate::simulation::{ProcessImage, SharedProcessImage};

/// Modbus service exposing a shared [`ProcessImage`].
///
/// One instance is created per connection; all instances share the same
/// image. Each request holds the image lock for its whole duration, so a
/// request never observes a partially applied generator tick.
#[derive(Clone)]
pub struct ControllerModbusService {
    image: SharedProcessImage,
    running: Arc<AtomicBool>,
}

impl tokio_modbus::server::Service for ControllerModbusService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        if !self.running.load(Ordering::SeqCst) {
            debug!("SERVER: controller stopped, rejecting {req:?}");
            return future::ready(Err(ExceptionCode::ServerDeviceFailure));
        }

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => self
                .with_image(|image| image.read_registers(addr, cnt))
                .map(Response::ReadHoldingRegisters),
            Request::ReadCoils(addr, cnt) => self
                .with_image(|image| image.read_coils(addr, cnt))
                .map(Response::ReadCoils),
            Request::WriteSingleRegister(addr, value) => self
                .with_image(|image| image.write_registers(addr, std::slice::from_ref(&value)))
                .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => self
                .with_image(|image| image.write_registers(addr, &values))
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            Request::WriteSingleCoil(addr, state) => self
                .with_image(|image| image.write_coils(addr, std::slice::from_ref(&state)))
                .map(|_| Response::WriteSingleCoil(addr, state)),
            Request::WriteMultipleCoils(addr, states) => self
                .with_image(|image| image.write_coils(addr, &states))
                .map(|_| Response::WriteMultipleCoils(addr, states.len() as u16)),
            _ => {
                error!("SERVER: Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl ControllerModbusService {
    /// Serve `image` while `running` is set.
    pub fn new(image: SharedProcessImage, running: Arc<AtomicBool>) -> Self {
        Self { image, running }
    }

    /// Service over a fresh image, always running.
    pub fn standalone(image: ProcessImage) -> Self {
        Self::new(
            Arc::new(Mutex::new(image)),
            Arc::new(AtomicBool::new(true)),
        )
    }

    pub fn image(&self) -> SharedProcessImage {
        self.image.clone()
    }

    fn with_image<T>(
        &self,
        f: impl FnOnce(&mut ProcessImage) -> Result<T, ExceptionCode>,
    ) -> Result<T, ExceptionCode> {
        match self.image.lock() {
            Ok(mut image) => f(&mut image),
            Err(_) => {
                error!("SERVER: Exception::ServerDeviceFailure - process image lock poisoned");
                Err(ExceptionCode::ServerDeviceFailure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use tokio_modbus::server::Service;

    fn service() -> ControllerModbusService {
        let image = ProcessImage::from_config(&ControllerConfig::default()).unwrap();
        ControllerModbusService::standalone(image)
    }

    #[tokio::test]
    async fn test_read_and_write_dispatch() {
        let service = service();
        let rsp = service
            .call(Request::ReadHoldingRegisters(30, 2))
            .await
            .unwrap();
        assert_eq!(rsp, Response::ReadHoldingRegisters(vec![1250, 850]));

        let rsp = service.call(Request::WriteSingleCoil(22, true)).await.unwrap();
        assert_eq!(rsp, Response::WriteSingleCoil(22, true));
        let rsp = service.call(Request::ReadCoils(22, 1)).await.unwrap();
        assert_eq!(rsp, Response::ReadCoils(vec![true]));

        let rsp = service
            .call(Request::WriteSingleRegister(0, 300))
            .await
            .unwrap();
        assert_eq!(rsp, Response::WriteSingleRegister(0, 300));
        assert_eq!(service.image().lock().unwrap().register(0), Some(300));
    }

    #[tokio::test]
    async fn test_poisoned_image_reports_device_failure() {
        let service = service();
        let image = service.image();
        let _ = std::thread::spawn(move || {
            let _guard = image.lock().unwrap();
            panic!("generator crashed while holding the image");
        })
        .join();

        assert_eq!(
            service.call(Request::ReadHoldingRegisters(0, 1)).await,
            Err(ExceptionCode::ServerDeviceFailure)
        );
    }

    #[tokio::test]
    async fn test_unsupported_requests() {
        let service = service();
        assert_eq!(
            service.call(Request::ReadInputRegisters(0, 1)).await,
            Err(ExceptionCode::IllegalFunction)
        );
        assert_eq!(
            service.call(Request::ReadDiscreteInputs(20, 1)).await,
            Err(ExceptionCode::IllegalFunction)
        );
    }

    #[tokio::test]
    async fn test_stopped_service_reports_device_failure() {
        let image = ProcessImage::from_config(&ControllerConfig::default()).unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let service = ControllerModbusService::new(Arc::new(Mutex::new(image)), running.clone());
        assert!(service.call(Request::ReadCoils(20, 1)).await.is_ok());

        running.store(false, Ordering::SeqCst);
        assert_eq!(
            service.call(Request::ReadCoils(20, 1)).await,
            Err(ExceptionCode::ServerDeviceFailure)
        );
    }
}
