//! Scope and variable requests.
//! - handle_scopes: scopes of one frame
//! - handle_variables: variables behind a reference

use serde_json::Value;

use crate::protocol::{
    Request, Scope, ScopesArguments, ScopesResponseBody, Variable, VariablesArguments,
    VariablesResponseBody,
};

use super::super::util::arguments;
use super::super::{DebugAdapter, DispatchOutcome, ErrorCode};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_scopes(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = arguments::<ScopesArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        if let Some(rejected) = self.require_suspended(&request) {
            return rejected;
        }
        let scopes = match self.supervisor.scopes(args.frame_id) {
            Ok(scopes) => scopes,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };
        let body = ScopesResponseBody {
            scopes: scopes
                .into_iter()
                .map(|scope| Scope {
                    name: scope.name,
                    variables_reference: scope.variables_reference,
                    expensive: scope.expensive,
                })
                .collect(),
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_variables(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = arguments::<VariablesArguments>(&request) else {
            return self.invalid_arguments(&request);
        };
        if let Some(rejected) = self.require_suspended(&request) {
            return rejected;
        }
        let variables = match self.supervisor.variables(args.variables_reference) {
            Ok(variables) => variables,
            Err(err) => {
                return self.failure(&request, ErrorCode::for_host_error(&err), &err.to_string());
            }
        };
        let body = VariablesResponseBody {
            variables: variables
                .into_iter()
                .map(|variable| Variable {
                    name: variable.name,
                    value: variable.value,
                    r#type: variable.type_name,
                    variables_reference: variable.variables_reference,
                })
                .collect(),
        };
        DispatchOutcome {
            responses: vec![self.ok_response(&request, Some(body))],
            ..DispatchOutcome::default()
        }
    }
}
