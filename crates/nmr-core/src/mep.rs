//! # MEP State Machine
//!
//! Legality checks run by a channel before it accepts a send. The checks
//! depend on who is sending (the role the exchange is in), whether this is
//! the first hop, and the pattern:
//!
//! | Pattern | Provider may send | Consumer closes with |
//! |---------|-------------------|----------------------|
//! | InOnly | Done, Error | (provider terminates) |
//! | RobustInOnly | Active+Fault, Done, Error | Done/Error after Fault |
//! | InOut | Active+Out, Active+Fault, Error | Done/Error |
//! | InOptionalOut | Active+Out, Done, Error | Done/Error after Out |
//! | InOptionalRobustInOut | Active+Out, Active+Fault, Done, Error | Done/Error after Out/Fault |
//!
//! The first consumer send must be Active, carry an In message and a target,
//! and must not carry Out or Fault. Nothing can be sent once a terminal
//! status has been sent.

use crate::endpoint::EndpointId;
use crate::exchange::ExchangeState;
use nmr_types::{NmrError, Pattern, Role, Status};

/// Validates a send of `state` by the endpoint `sender`.
pub(crate) fn validate_send(
    state: &ExchangeState,
    pattern: Pattern,
    sender: EndpointId,
) -> Result<(), NmrError> {
    if state.completed {
        return Err(NmrError::invalid_state(
            "exchange has already completed and cannot be sent again",
        ));
    }
    if state.in_transit {
        return Err(NmrError::invalid_state(
            "exchange is in transit and owned by the counterpart",
        ));
    }
    if state.out_message.is_some() && state.fault.is_some() {
        return Err(NmrError::invalid_state(
            "exchange carries both an Out and a Fault message",
        ));
    }
    if state.out_message.is_some() && !pattern.allows_out() {
        return Err(NmrError::unsupported(format!(
            "Out message is not allowed on a {pattern} exchange"
        )));
    }
    if state.fault.is_some() && !pattern.allows_fault() {
        return Err(NmrError::unsupported(format!(
            "Fault message is not allowed on a {pattern} exchange"
        )));
    }

    match state.role {
        Role::Consumer => match state.source {
            None => validate_first_send(state),
            Some(source) if source != sender => Err(NmrError::invalid_state(
                "only the consumer channel may send on the consumer's turn",
            )),
            Some(_) => validate_consumer_close(state, pattern),
        },
        Role::Provider => {
            if state.destination != Some(sender) {
                return Err(NmrError::invalid_state(
                    "only the provider channel may send on the provider's turn",
                ));
            }
            validate_provider_reply(state, pattern)
        }
    }
}

fn validate_first_send(state: &ExchangeState) -> Result<(), NmrError> {
    if state.status != Status::Active {
        return Err(NmrError::invalid_state(format!(
            "a new exchange must be sent Active, not {}",
            state.status
        )));
    }
    if state.target.is_none() {
        return Err(NmrError::invalid_state("exchange has no target"));
    }
    if state.in_message.is_none() {
        return Err(NmrError::invalid_state("exchange has no In message"));
    }
    if state.out_message.is_some() || state.fault.is_some() {
        return Err(NmrError::invalid_state(
            "a consumer cannot send Out or Fault on the first hop",
        ));
    }
    Ok(())
}

fn validate_consumer_close(state: &ExchangeState, pattern: Pattern) -> Result<(), NmrError> {
    if !state.status.is_terminal() {
        return Err(NmrError::invalid_state(format!(
            "a consumer answers a {pattern} reply with Done or Error only"
        )));
    }
    if pattern == Pattern::InOnly {
        return Err(NmrError::invalid_state(
            "the provider terminates InOnly exchanges",
        ));
    }
    Ok(())
}

fn validate_provider_reply(state: &ExchangeState, pattern: Pattern) -> Result<(), NmrError> {
    let has_reply = state.out_message.is_some() || state.fault.is_some();
    match state.status {
        Status::Active if !has_reply => Err(NmrError::invalid_state(format!(
            "an Active {pattern} reply needs an Out or Fault message"
        ))),
        Status::Active => Ok(()),
        Status::Done if !pattern.allows_provider_done() => Err(NmrError::invalid_state(format!(
            "a provider cannot complete a {pattern} exchange with Done"
        ))),
        Status::Done if has_reply => Err(NmrError::invalid_state(
            "a Done reply cannot carry Out or Fault",
        )),
        Status::Done | Status::Error => Ok(()),
    }
}
