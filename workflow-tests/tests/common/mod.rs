//! Common test utilities for workflow integration tests.

#![allow(dead_code)]

use workflow_tests::WorkflowTestContext;

/// Start an issuer and the module gateways for one test.
pub async fn setup() -> WorkflowTestContext {
    WorkflowTestContext::new()
        .await
        .expect("Failed to start workflow test services")
}
