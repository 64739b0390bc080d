//! Access policy guard: per-operation authorization based on caller role and
//! resource ownership. Denials are `Forbidden`, deliberately distinct from
//! `NotFound` (absent target) and `Validation` (malformed input).

use crate::domain::actor::{Actor, Role};
use crate::domain::request::{RequestPatch, ServiceRequest};
use crate::errors::ServiceError;

/// Any authenticated passenger may open a request; crew manage requests but
/// do not submit them.
pub fn ensure_can_create(actor: &Actor) -> Result<(), ServiceError> {
    match actor.role {
        Role::Passenger => Ok(()),
        Role::Crew | Role::Admin => {
            Err(ServiceError::forbidden("only passengers may create requests"))
        }
    }
}

/// Read access: the owning passenger, or any crew/admin.
pub fn ensure_can_read(actor: &Actor, request: &ServiceRequest) -> Result<(), ServiceError> {
    if actor.role.is_privileged() || request.submitter_id == actor.id {
        Ok(())
    } else {
        Err(ServiceError::forbidden("request belongs to another passenger"))
    }
}

/// Update access follows read access; field-level restrictions are applied
/// separately by [`sanitize_patch`].
pub fn ensure_can_update(actor: &Actor, request: &ServiceRequest) -> Result<(), ServiceError> {
    ensure_can_read(actor, request)
}

pub fn ensure_can_delete(actor: &Actor, request: &ServiceRequest) -> Result<(), ServiceError> {
    ensure_can_read(actor, request)
}

/// Chat append access: the owning passenger or any crew/admin.
pub fn ensure_can_message(actor: &Actor, request: &ServiceRequest) -> Result<(), ServiceError> {
    ensure_can_read(actor, request)
}

pub fn ensure_can_view_stats(actor: &Actor) -> Result<(), ServiceError> {
    if actor.role.is_privileged() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("stats are crew only"))
    }
}

/// Strips fields the caller's role may not write. A passenger patch carrying
/// `status` or `assignedTo` is not an error: the fields are dropped silently
/// and the rest of the patch is honored. Returns the names of dropped fields
/// for audit logging.
pub fn sanitize_patch(role: Role, mut patch: RequestPatch) -> (RequestPatch, Vec<&'static str>) {
    let mut dropped = Vec::new();
    if !role.is_privileged() {
        if patch.status.take().is_some() {
            dropped.push("status");
        }
        if patch.assigned_to.take().is_some() {
            dropped.push("assignedTo");
        }
    }
    (patch, dropped)
}
