// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contact requests from prospective buyers and tenants.
//!
//! The inquiry is stored first and then emailed. When the mailer is not
//! configured or the relay refuses the message the record stays with
//! `delivered = false` and the caller gets 503.
//!
//! Mail only ever goes to the listing owner or the configured
//! `INQUIRY_RECIPIENT`; the sender never chooses the recipient.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::{extract::JsonBody, Envelope},
    auth::directory::normalize_email,
    error::ApiError,
    mail::escape_html,
    state::AppState,
    storage::{timestamp, InquiryRepository, PropertyRepository, StoredInquiry},
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InquiryRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub phone: Option<String>,
    pub property_id: Option<String>,
    pub property_title: Option<String>,
}

/// Acknowledgement returned to the sender. The recipient is not disclosed.
#[derive(Debug, Serialize, ToSchema)]
pub struct InquiryReceipt {
    pub id: String,
    pub delivered: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    non_blank(value).ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

fn render_bodies(inquiry: &StoredInquiry) -> (String, String, String) {
    let about = inquiry
        .property_title
        .as_deref()
        .unwrap_or("your listing");
    let subject = format!("New inquiry about {about}");
    let phone = inquiry.phone.as_deref().unwrap_or("not given");

    let text = format!(
        "{name} <{email}> sent an inquiry about {about}.\n\nPhone: {phone}\n\n{message}\n",
        name = inquiry.name,
        email = inquiry.email,
        message = inquiry.message,
    );
    let html = format!(
        "<p><strong>{name}</strong> &lt;{email}&gt; sent an inquiry about {about}.</p>\
         <p>Phone: {phone}</p><p>{message}</p>",
        name = escape_html(&inquiry.name),
        email = escape_html(&inquiry.email),
        about = escape_html(about),
        phone = escape_html(phone),
        message = escape_html(&inquiry.message).replace('\n', "<br>"),
    );
    (subject, text, html)
}

#[utoipa::path(
    post,
    path = "/api/send-inquiry",
    request_body = InquiryRequest,
    tag = "Inquiries",
    responses(
        (status = 200, description = "Inquiry delivered", body = InquiryReceipt),
        (status = 400, description = "Missing or invalid field"),
        (status = 503, description = "Mail is not configured or delivery failed")
    )
)]
pub async fn send_inquiry(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<InquiryRequest>,
) -> Result<Json<Envelope<InquiryReceipt>>, ApiError> {
    let name = required("name", request.name)?;
    let email = normalize_email(&required("email", request.email)?);
    let message = required("message", request.message)?;
    let property_id = non_blank(request.property_id);

    let property = match &property_id {
        Some(id) => PropertyRepository::new(&state.db)
            .get(id)
            .map_err(|e| state.store_error("Property", e))?,
        None => None,
    };

    let recipient = property
        .as_ref()
        .and_then(|p| p.owner_email.clone())
        .or_else(|| state.config.inquiry_recipient.clone())
        .ok_or_else(|| ApiError::service_unavailable("No inquiry recipient is configured"))?;

    let inquiry = StoredInquiry {
        id: uuid::Uuid::new_v4().to_string(),
        property_title: non_blank(request.property_title).or_else(|| property.map(|p| p.title)),
        property_id,
        name,
        email,
        phone: non_blank(request.phone),
        message,
        recipient,
        delivered: false,
        created_at: timestamp::now(),
    };
    InquiryRepository::new(&state.db)
        .create(&inquiry)
        .map_err(|e| state.store_error("Inquiry", e))?;

    let Some(mailer) = state.mailer.as_ref() else {
        tracing::warn!(inquiry_id = %inquiry.id, "Inquiry stored but mail is not configured");
        return Err(ApiError::service_unavailable("Email delivery is not configured"));
    };

    let (subject, text, html) = render_bodies(&inquiry);
    if let Err(e) = mailer
        .send(&inquiry.recipient, Some(&inquiry.email), &subject, &text, &html)
        .await
    {
        tracing::warn!(inquiry_id = %inquiry.id, error = %e, "Inquiry email failed");
        return Err(ApiError::service_unavailable("Failed to send inquiry"));
    }

    if let Err(e) = InquiryRepository::new(&state.db).mark_delivered(&inquiry.id) {
        tracing::warn!(inquiry_id = %inquiry.id, error = %e, "Failed to mark inquiry delivered");
    }
    tracing::info!(inquiry_id = %inquiry.id, property_id = ?inquiry.property_id, "Inquiry sent");

    Ok(Json(
        Envelope::ok(InquiryReceipt {
            id: inquiry.id,
            delivered: true,
        })
        .with_message("Inquiry sent successfully"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Category, ListingType, StoredProperty};
    use crate::test_support::{json_request, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    fn request(property_id: Option<String>) -> InquiryRequest {
        InquiryRequest {
            name: Some("Alex".to_string()),
            email: Some("Alex@Example.com".to_string()),
            message: Some("Is it still available? <b>urgent</b>".to_string()),
            property_id,
            ..Default::default()
        }
    }

    fn seed_property(app: &TestApp, owner: &str) -> StoredProperty {
        let now = timestamp::now();
        let property = StoredProperty {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Canal-side flat".to_string(),
            location: "Leeds".to_string(),
            price: "950".to_string(),
            beds: 2,
            baths: 1,
            description: String::new(),
            category: Category::Apartment,
            listing_type: ListingType::Rent,
            images: vec![],
            size: None,
            owner_name: None,
            owner_email: Some(owner.to_string()),
            created_at: now,
            updated_at: now,
        };
        PropertyRepository::new(&app.state.db).create(&property).unwrap();
        property
    }

    #[tokio::test]
    async fn inquiry_goes_to_listing_owner() {
        let mut app = TestApp::new();
        let outbox = app.with_outbox();
        let property = seed_property(&app, "owner@example.com");

        let Json(envelope) = send_inquiry(State(app.state.clone()), JsonBody(request(Some(property.id.clone()))))
            .await
            .unwrap();
        assert!(envelope.data.delivered);

        let sent = outbox.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert_eq!(sent[0].reply_to.as_deref(), Some("alex@example.com"));
        assert!(sent[0].subject.contains("Canal-side flat"));

        let stored = InquiryRepository::new(&app.state.db)
            .get(&envelope.data.id)
            .unwrap()
            .unwrap();
        assert!(stored.delivered);
        assert_eq!(stored.property_title.as_deref(), Some("Canal-side flat"));
    }

    #[tokio::test]
    async fn inquiry_without_property_uses_configured_recipient() {
        let mut app = TestApp::with_config(|config| {
            config.inquiry_recipient = Some("desk@realty.test".to_string());
        });
        let outbox = app.with_outbox();

        send_inquiry(State(app.state.clone()), JsonBody(request(None)))
            .await
            .unwrap();
        assert_eq!(outbox.lock().unwrap()[0].to, "desk@realty.test");
    }

    #[tokio::test]
    async fn sender_cannot_choose_the_recipient() {
        let mut app = TestApp::with_config(|config| {
            config.inquiry_recipient = Some("desk@realty.test".to_string());
        });
        let outbox = app.with_outbox();

        let (status, _) = app
            .call(json_request(
                "POST",
                "/api/send-inquiry",
                None,
                Some(json!({
                    "name": "Alex",
                    "email": "alex@example.com",
                    "message": "Hello",
                    "recipient": "anyone@victim.test"
                })),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);

        let sent = outbox.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "desk@realty.test");
    }

    #[tokio::test]
    async fn inquiry_without_any_recipient_is_unavailable() {
        let mut app = TestApp::new();
        let outbox = app.with_outbox();

        let err = send_inquiry(State(app.state.clone()), JsonBody(request(None)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(outbox.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inquiry_without_mailer_is_stored_undelivered() {
        let app = TestApp::new();
        let property = seed_property(&app, "owner@example.com");

        let err = send_inquiry(State(app.state.clone()), JsonBody(request(Some(property.id))))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let stored: Vec<StoredInquiry> = app
            .state
            .db
            .scan_docs(crate::storage::database::INQUIRIES)
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].delivered);
    }

    #[tokio::test]
    async fn inquiry_requires_name_email_and_message() {
        let app = TestApp::new();
        let mut missing_message = request(None);
        missing_message.message = Some("   ".to_string());

        let err = send_inquiry(State(app.state.clone()), JsonBody(missing_message))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn html_body_is_escaped() {
        let inquiry = StoredInquiry {
            id: "i".to_string(),
            property_id: None,
            property_title: Some("<Loft>".to_string()),
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
            phone: None,
            message: "<script>x</script>".to_string(),
            recipient: "owner@example.com".to_string(),
            delivered: false,
            created_at: timestamp::now(),
        };

        let (_, text, html) = render_bodies(&inquiry);
        assert!(text.contains("<script>x</script>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;Loft&gt;"));
    }
}
