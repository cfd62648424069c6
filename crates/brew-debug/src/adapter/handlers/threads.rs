//! Thread requests.
//! - handle_threads: the single debuggee thread

use serde_json::Value;

use crate::protocol::{Request, Thread, ThreadsResponseBody};

use super::super::{DebugAdapter, DispatchOutcome, THREAD_ID};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_threads(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let body = ThreadsResponseBody {
            threads: vec![Thread {
                id: THREAD_ID,
                name: "main".to_string(),
            }],
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }
}
