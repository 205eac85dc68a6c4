//! Incoming request dispatch and handlers (`spec.md` §4.5, component C5).
//! Every handler takes the decoded request body and returns the fields to
//! merge into a successful response; validation/auth/store failures are
//! `Err`, converted by [`dispatch`] into a `{status: 0, error}` response
//! without tearing down the session.

use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use serde_json::{json, Value};
use zway_proto::{hash, logging, optional_field, required_field, AccountId, Error, RequestId, Result, ResponseHead};
use zway_store::{Account, AccountQuery, InboxEntry, RequestKind, RequestPayload, RequestQuery, RequestRecord};

use crate::contact::{ContactConfig, SessionConfig};
use crate::session::{Session, SessionState};
use crate::status;

pub async fn dispatch(session: &Arc<Session>, body: Bytes) -> Result<()> {
    let head = zway_proto::decode_request(&body)?;
    let kind = RequestKind::from_code(head.request_type).ok_or(Error::UnknownRequestType(head.request_type))?;

    if requires_auth(kind) && session.state() != SessionState::LoggedIn {
        return respond(session, head.request_id, Err(Error::NotAuthenticated));
    }
    if kind == RequestKind::CreateAccount && session.state() == SessionState::LoggedIn {
        return respond(session, head.request_id, Err(Error::AlreadyAuthenticated));
    }

    let outcome = match kind {
        RequestKind::CreateAccount => create_account(session, &head.fields).await,
        RequestKind::Login => login(session, &head.fields).await,
        RequestKind::Logout => logout(session).await,
        RequestKind::Config => configure(session, &head.fields).await,
        RequestKind::FindContact => find_contact(session, &head.fields).await,
        RequestKind::AddContact => add_contact(session, &head.fields).await,
        RequestKind::CreateAddCode => create_add_code(session).await,
        RequestKind::AcceptContact => accept_contact(session, &head.fields).await,
        RequestKind::RejectContact => reject_contact(session, &head.fields).await,
        RequestKind::ContactStatus => contact_status(session).await,
        RequestKind::Push => push(session, &head.fields).await,
        RequestKind::Dispatch => dispatch_ack(session, &head.fields).await,
    };

    respond(session, head.request_id, outcome)
}

fn requires_auth(kind: RequestKind) -> bool {
    !matches!(kind, RequestKind::CreateAccount | RequestKind::Login)
}

fn respond(session: &Arc<Session>, request_id: RequestId, outcome: Result<Value>) -> Result<()> {
    let response = match outcome {
        Ok(fields) => ResponseHead::ok(request_id, fields),
        Err(err) => {
            if err.closes_session() {
                return Err(err);
            }
            if matches!(err, Error::StoreUnavailable | Error::StoreError(_)) {
                logging::error!(session.log, "request failed"; "error" => err.to_string());
            }
            ResponseHead::failed(request_id, &err)
        }
    };
    session.send_response(&response)
}

fn decode_password(fields: &Value) -> Result<[u8; 32]> {
    let encoded: String = required_field(fields, "password")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| Error::MissingField("password"))?;
    bytes.try_into().map_err(|_| Error::MissingField("password"))
}

async fn create_account(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let name: String = required_field(fields, "name")?;
    if name.trim().is_empty() {
        return Err(Error::InvalidName);
    }
    let password = decode_password(fields)?;
    let phone: Option<String> = optional_field(fields, "phone");
    let find_by_name: bool = optional_field(fields, "findByName").unwrap_or(true);
    let find_by_phone: bool = optional_field(fields, "findByPhone").unwrap_or(false);

    let existing = session
        .ctx
        .store
        .get_account(&AccountQuery {
            name: Some(name.clone()),
            ..Default::default()
        })
        .await?;
    if existing.is_some() {
        return Err(Error::InvalidName);
    }

    let salt = hash::random_salt();
    let verifier = hash::verifier(&password, &salt);
    let account_id = session.ctx.store.new_account_id().await?;

    session
        .ctx
        .store
        .insert_account(Account {
            id: account_id,
            name,
            phone,
            find_by_name,
            find_by_phone,
            verifier,
            salt,
            fcm_token: None,
        })
        .await?;

    Ok(json!({ "accountId": account_id }))
}

async fn login(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let name: String = required_field(fields, "name")?;
    let password = decode_password(fields)?;

    let account = session
        .ctx
        .store
        .get_account(&AccountQuery {
            name: Some(name),
            ..Default::default()
        })
        .await?
        .ok_or(Error::InvalidCredentials)?;

    if !hash::verify(&password, &account.salt, &account.verifier) {
        return Err(Error::InvalidCredentials);
    }

    session.promote(account.id);

    if let Some(config) = optional_field::<SessionConfig>(fields, "config") {
        apply_config(session, config).await?;
    }

    let contact_status = current_contact_status(session, account.id).await?;
    let inbox = session.ctx.store.get_inbox(account.id).await?;

    let session = session.clone();
    let account_id = account.id;
    tokio::spawn(async move {
        if let Err(err) = status::process_user_requests(&session.ctx, account_id).await {
            logging::warn!(session.log, "post-login delivery failed"; "error" => err.to_string());
        }
    });

    Ok(json!({
        "contactStatus": contact_status,
        "inbox": inbox_to_json(inbox),
    }))
}

fn inbox_to_json(inbox: Vec<InboxEntry>) -> Value {
    Value::Array(
        inbox
            .into_iter()
            .map(|entry| {
                json!({
                    "contactId": entry.contact_id,
                    "requestIds": entry.request_ids,
                })
            })
            .collect(),
    )
}

async fn current_contact_status(session: &Arc<Session>, self_id: AccountId) -> Result<Value> {
    let contacts: Vec<(AccountId, bool)> = session
        .contacts
        .lock()
        .values()
        .map(|c| (c.contact_id, c.notify_status))
        .collect();

    let mut entries = Vec::with_capacity(contacts.len());
    for (contact_id, _) in contacts {
        if contact_id == self_id {
            continue;
        }
        let online = session.ctx.registry.has_sessions(contact_id);
        entries.push(json!({ "contactId": contact_id, "status": online as u32 }));
    }
    Ok(Value::Array(entries))
}

async fn logout(session: &Arc<Session>) -> Result<Value> {
    if session.state() != SessionState::LoggedIn {
        return Ok(json!({}));
    }
    session.ctx.store.set_fcm_token(session.account_id(), "").await?;
    session.demote();
    status::broadcast_status(session, 0).await?;
    Ok(json!({}))
}

async fn apply_config(session: &Arc<Session>, config: SessionConfig) -> Result<()> {
    if let Some(token) = &config.fcm_token {
        session.ctx.store.set_fcm_token(session.account_id(), token).await?;
    }
    *session.config.lock() = config;
    Ok(())
}

async fn configure(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let new_contacts: Option<Vec<ContactConfig>> = optional_field(fields, "contacts");
    let mut status_changed = false;

    if let Some(contacts) = new_contacts {
        let mut map = session.contacts.lock();
        for contact in contacts {
            let changed = map
                .get(&contact.contact_id)
                .map_or(true, |existing| existing.notify_status != contact.notify_status);
            status_changed |= changed;
            map.insert(contact.contact_id, contact);
        }
    }

    if let Some(config) = optional_field::<SessionConfig>(fields, "config") {
        apply_config(session, config).await?;
    }

    if status_changed {
        status::broadcast_status(session, session.effective_notify_status()).await?;
    }

    Ok(json!({}))
}

async fn find_contact(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let subject: String = required_field(fields, "subject")?;
    let self_id = session.account_id();

    let contacts = session
        .ctx
        .store
        .get_contacts(&AccountQuery {
            name_substring: Some(subject),
            exclude_id: Some(self_id),
            require_find_by_name: true,
            ..Default::default()
        })
        .await?;

    Ok(Value::Array(
        contacts
            .into_iter()
            .map(|a| json!({ "id": a.id, "name": a.name }))
            .collect(),
    ))
}

async fn add_contact(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let self_id = session.account_id();
    let public_key: Value = required_field(fields, "publicKey")?;
    if !public_key.is_object() {
        return Err(Error::InvalidPublicKey);
    }

    let add_code: Option<String> = optional_field(fields, "addCode");
    let contact = match add_code {
        Some(ref code) => {
            let candidates = session
                .ctx
                .store
                .get_requests(&RequestQuery {
                    kind: Some(RequestKind::AddContact),
                    ..Default::default()
                })
                .await?;
            let request = candidates
                .into_iter()
                .find(|r| r.payload.add_code.as_deref() == Some(code.as_str()))
                .ok_or(Error::InvalidAddCode)?;
            session
                .ctx
                .store
                .get_account(&AccountQuery { id: Some(request.src), ..Default::default() })
                .await?
                .ok_or(Error::InvalidAddCode)?
        }
        None => {
            let name: String = required_field(fields, "name")?;
            session
                .ctx
                .store
                .get_account(&AccountQuery {
                    name: Some(name),
                    require_find_by_name: true,
                    ..Default::default()
                })
                .await?
                .ok_or(Error::NotFound)?
        }
    };

    if contact.id == self_id {
        return Err(Error::InvalidName);
    }

    let already_pending = session
        .ctx
        .store
        .request_pending(&RequestQuery {
            kind: Some(RequestKind::AddContact),
            src: Some(self_id),
            dst: Some(contact.id),
        })
        .await?;
    if already_pending {
        return Err(Error::Duplicate);
    }

    let self_account = session
        .ctx
        .store
        .get_account(&AccountQuery { id: Some(self_id), ..Default::default() })
        .await?
        .ok_or(Error::NotFound)?;

    let add_code = hash::random_add_code();
    session
        .ctx
        .store
        .add_request(RequestRecord {
            id: RequestId(rand_u32()),
            kind: RequestKind::AddContact,
            src: self_id,
            dst: contact.id,
            time: zway_proto::time::timestamp_secs(),
            ttl: 0,
            payload: RequestPayload {
                add_code: Some(add_code.clone()),
                name: Some(self_account.name.clone()),
                phone: self_account.phone.clone(),
                public_key: Some(public_key),
                ..Default::default()
            },
        })
        .await?;

    status::schedule_process_user_requests(session, contact.id);

    Ok(json!({ "addCode": add_code, "name": contact.name, "phone": contact.phone.unwrap_or_default() }))
}

async fn create_add_code(session: &Arc<Session>) -> Result<Value> {
    let add_code = hash::random_add_code();
    session
        .ctx
        .store
        .add_request(RequestRecord {
            id: RequestId(rand_u32()),
            kind: RequestKind::AddContact,
            src: session.account_id(),
            dst: AccountId::BROADCAST,
            time: zway_proto::time::timestamp_secs(),
            ttl: 0,
            payload: RequestPayload {
                add_code: Some(add_code.clone()),
                ..Default::default()
            },
        })
        .await?;

    Ok(json!({ "addCode": add_code }))
}

async fn accept_contact(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let self_id = session.account_id();
    let contact_request_id: RequestId = required_field(fields, "contactRequestId")?;
    let public_key: Value = required_field(fields, "publicKey")?;
    if !public_key.is_object() {
        return Err(Error::InvalidPublicKey);
    }

    let request = session
        .ctx
        .store
        .get_request(&RequestQuery {
            id: Some(contact_request_id),
            kind: Some(RequestKind::AddContact),
            dst: Some(self_id),
            ..Default::default()
        })
        .await?
        .ok_or(Error::NotFound)?;

    session
        .ctx
        .store
        .delete_request(&RequestQuery { id: Some(contact_request_id), ..Default::default() })
        .await?;

    let self_account = session
        .ctx
        .store
        .get_account(&AccountQuery { id: Some(self_id), ..Default::default() })
        .await?
        .ok_or(Error::NotFound)?;

    session
        .ctx
        .store
        .add_request(RequestRecord {
            id: RequestId(rand_u32()),
            kind: RequestKind::AcceptContact,
            src: self_id,
            dst: request.src,
            time: zway_proto::time::timestamp_secs(),
            ttl: 0,
            payload: RequestPayload {
                name: Some(self_account.name.clone()),
                phone: self_account.phone.clone(),
                public_key: Some(public_key),
                ..Default::default()
            },
        })
        .await?;

    session.contacts.lock().insert(
        request.src,
        ContactConfig {
            contact_id: request.src,
            notify_status: true,
        },
    );

    status::schedule_process_user_requests(session, request.src);

    Ok(json!({
        "name": request.payload.name.unwrap_or_default(),
        "phone": request.payload.phone.unwrap_or_default(),
        "publicKey": request.payload.public_key.unwrap_or(Value::Null),
    }))
}

async fn reject_contact(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let self_id = session.account_id();
    let contact_request_id: RequestId = required_field(fields, "contactRequestId")?;

    let request = session
        .ctx
        .store
        .get_request(&RequestQuery {
            id: Some(contact_request_id),
            kind: Some(RequestKind::AddContact),
            dst: Some(self_id),
            ..Default::default()
        })
        .await?
        .ok_or(Error::NotFound)?;

    session
        .ctx
        .store
        .delete_request(&RequestQuery { id: Some(contact_request_id), ..Default::default() })
        .await?;

    session
        .ctx
        .store
        .add_request(RequestRecord {
            id: RequestId(rand_u32()),
            kind: RequestKind::RejectContact,
            src: self_id,
            dst: request.src,
            time: zway_proto::time::timestamp_secs(),
            ttl: 0,
            payload: RequestPayload::default(),
        })
        .await?;

    status::schedule_process_user_requests(session, request.src);

    Ok(json!({}))
}

async fn contact_status(session: &Arc<Session>) -> Result<Value> {
    let self_id = session.account_id();
    current_contact_status(session, self_id).await
}

async fn push(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let self_id = session.account_id();
    let resources: Value = required_field(fields, "resources")?;
    let keys: Vec<Value> = required_field(fields, "keys")?;
    let salt: Option<Value> = optional_field(fields, "salt");
    let meta: Option<Value> = optional_field(fields, "meta");

    for key in &keys {
        let dst = key
            .get("dst")
            .and_then(|v| v.as_u64())
            .map(|v| AccountId(v as u32))
            .ok_or(Error::MissingField("dst"))?;
        if dst == self_id {
            continue;
        }

        session
            .ctx
            .store
            .add_request(RequestRecord {
                id: RequestId(rand_u32()),
                kind: RequestKind::Push,
                src: self_id,
                dst,
                time: zway_proto::time::timestamp_secs(),
                ttl: 0,
                payload: RequestPayload {
                    data: Some(json!({
                        "requestType": RequestKind::Push.code(),
                        "src": self_id,
                        "resources": resources.clone(),
                        "salt": salt.clone(),
                        "meta": meta.clone(),
                        "key": key.get("key").cloned().unwrap_or(Value::Null),
                    })),
                    ..Default::default()
                },
            })
            .await?;

        status::schedule_process_user_requests(session, dst);
    }

    let resource_ids: Vec<Value> = resources
        .as_array()
        .map(|list| list.iter().filter_map(|r| r.get("id").cloned()).collect())
        .unwrap_or_default();

    Ok(json!({ "resources": resource_ids }))
}

async fn dispatch_ack(session: &Arc<Session>, fields: &Value) -> Result<Value> {
    let self_id = session.account_id();
    let dispatch_id: RequestId = required_field(fields, "dispatchId")?;

    let request = session
        .ctx
        .store
        .get_request(&RequestQuery { id: Some(dispatch_id), ..Default::default() })
        .await?
        .filter(|r| r.src == self_id || r.dst == self_id)
        .ok_or(Error::NotFound)?;

    session
        .ctx
        .store
        .delete_request(&RequestQuery { id: Some(request.id), ..Default::default() })
        .await?;

    Ok(json!({}))
}

fn rand_u32() -> u32 {
    use rand::RngCore;
    rand::thread_rng().next_u32().max(1)
}
