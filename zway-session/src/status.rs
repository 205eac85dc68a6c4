//! Delivery of persisted asynchronous requests to a reachable account, and
//! outbound contact-status broadcast (`spec.md` §4.5 "processUserRequests",
//! §4.8).

use std::sync::Arc;

use serde_json::json;
use zway_proto::{logging, AccountId, Result};
use zway_store::{AccountQuery, RequestKind, RequestQuery};

use crate::context::SessionContext;
use crate::session::Session;

/// Attempt delivery of every pending request addressed to `account_id`. If
/// the account has a live session, post each deliverable request over the
/// wire and delete it from the store once the client's `Dispatch`
/// acknowledgement arrives; otherwise fall back to a push notification
/// summarizing the backlog.
pub async fn process_user_requests(ctx: &Arc<SessionContext>, account_id: AccountId) -> Result<()> {
    let sessions = ctx.registry.get_sessions(account_id);
    let Some(session) = sessions.into_iter().next() else {
        return push_fallback(ctx, account_id).await;
    };

    let pending = ctx
        .store
        .get_requests(&RequestQuery {
            dst: Some(account_id),
            ..Default::default()
        })
        .await?;

    for request in pending {
        if !request.kind.is_deliverable() || session.pending.has_pending_kind(request.kind) {
            continue;
        }

        // `contactRequestId` lets an `AddContact` recipient later accept or
        // reject by referencing this exact stored record (`spec.md` §4.5/§8:
        // "Alice replies with AcceptContact{contactRequestId = Bob's request
        // id}"); `dispatchId` names the same id under the generic
        // `Dispatch` acknowledgement's field name.
        let fields = json!({
            "src": request.src,
            "contactRequestId": request.id,
            "dispatchId": request.id,
            "addCode": request.payload.add_code,
            "name": request.payload.name,
            "phone": request.payload.phone,
            "publicKey": request.payload.public_key,
            "data": request.payload.data,
        });

        if request.kind == RequestKind::Push {
            register_resource_senders(ctx, &session, &request.payload).await;
        }

        let rx = session.post_request(request.kind, fields)?;
        let response = Session::await_pending(rx).await?;
        if response.status == 1 {
            ctx.store
                .delete_request(&RequestQuery { id: Some(request.id), ..Default::default() })
                .await?;
        }
    }

    Ok(())
}

/// A `Push` request's `data.resources` names the attachments the sender
/// already uploaded as resource streams (`spec.md` §4.4/§4.5: the stream
/// id a resource upload used is the resource id named in the push). Any
/// still-live buffer is handed to a sender and queued on the active
/// stream-sender list so the ticker relays it to `dst` alongside the
/// notification itself.
async fn register_resource_senders(ctx: &Arc<SessionContext>, session: &Arc<Session>, payload: &zway_store::RequestPayload) {
    let Some(resources) = payload.data.as_ref().and_then(|data| data.get("resources")).and_then(|v| v.as_array()) else {
        return;
    };

    for resource in resources {
        let Some(id) = resource.get("id").and_then(|v| v.as_u64()) else { continue };
        let stream_id = zway_proto::StreamId(id as u32);
        if let Some(buffer) = ctx.stream_pool.get(stream_id).await {
            let parts = zway_net::parts_for_size(buffer.total_size().unwrap_or(0));
            let sender = zway_net::StreamSender::for_resource(stream_id, buffer, parts);
            ctx.stream_senders.register(session.clone(), sender);
        }
    }
}

async fn push_fallback(ctx: &Arc<SessionContext>, account_id: AccountId) -> Result<()> {
    let account = match ctx
        .store
        .get_account(&AccountQuery { id: Some(account_id), ..Default::default() })
        .await?
    {
        Some(account) => account,
        None => return Ok(()),
    };

    let token = match account.fcm_token.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => return Ok(()),
    };

    // Notification `type` here is a push-summary kind, not a request-kind
    // code: 1000 for a backlog of contact requests, 2000 for a backlog of
    // push requests (`spec.md` §4.5, scenario 5).
    const CONTACT_REQUEST_NOTIFICATION: u32 = 1000;
    const PUSH_REQUEST_NOTIFICATION: u32 = 2000;

    let contacts = ctx.store.num_contact_requests(account_id).await?;
    if contacts > 0 {
        ctx.push.send(token, CONTACT_REQUEST_NOTIFICATION, contacts).await;
    }

    let pushes = ctx.store.num_push_requests(account_id).await?;
    if pushes > 0 {
        ctx.push.send(token, PUSH_REQUEST_NOTIFICATION, pushes).await;
    }

    Ok(())
}

/// Fire off a delivery attempt without blocking the handler that just
/// persisted the request (`AddContact`/`AcceptContact`/`RejectContact`/`Push`).
pub fn schedule_process_user_requests(session: &Arc<Session>, account_id: AccountId) {
    let ctx = session.ctx.clone();
    let log = session.log.clone();
    tokio::spawn(async move {
        if let Err(err) = process_user_requests(&ctx, account_id).await {
            logging::warn!(log, "delivery attempt failed"; "account" => account_id.0, "error" => err.to_string());
        }
    });
}

/// Tell every contact subscribed to this session's status (`notifyStatus:
/// true`) that it changed (`spec.md` §4.8).
pub async fn broadcast_status(session: &Arc<Session>, status: u32) -> Result<()> {
    let self_id = session.account_id();
    let subscribed: Vec<AccountId> = session
        .contacts
        .lock()
        .values()
        .filter(|c| c.notify_status)
        .map(|c| c.contact_id)
        .collect();

    for contact_id in subscribed {
        for peer in session.ctx.registry.get_sessions(contact_id) {
            let _ = peer.post_notification(RequestKind::ContactStatus, json!({ "contactId": self_id, "status": status }));
        }
    }

    Ok(())
}
