/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Per-client delivery boundary. The engine assumes no wire protocol, only a
//! success/failure/timeout outcome per send.

use crate::envelope::Envelope;
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single delivery attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Failed(String),
    #[error("send timed out")]
    Timeout,
}

/// Outbound delivery seam. Implementations are external collaborators; the
/// coordinator bounds every call with its configured timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, client_id: &str, envelope: &Envelope) -> Result<(), TransportError>;
}
