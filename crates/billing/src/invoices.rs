//! Invoice creation and finalization against the Stripe REST API
//!
//! The async-stripe 0.39 surface for one-off invoices is incomplete, so this
//! module talks to the REST API directly with form-encoded posts (the same
//! approach used for invoice previews elsewhere in the codebase's lineage).

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// A finalized invoice ready to present to the user
#[derive(Debug, Clone, serde::Serialize)]
pub struct FinalizedInvoice {
    pub invoice_id: String,
    pub hosted_invoice_url: Option<String>,
    pub amount_due_cents: i64,
}

/// One-off invoice operations
pub struct InvoiceService {
    stripe: StripeClient,
    http: reqwest::Client,
    api_base: String,
}

impl InvoiceService {
    pub fn new(stripe: StripeClient) -> Self {
        Self {
            stripe,
            http: reqwest::Client::new(),
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> BillingResult<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/{}", self.api_base, path))
            .bearer_auth(&self.stripe.config().secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| BillingError::StripeApi(format!("Failed to call Stripe API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                path = path,
                error_body = %error_body,
                "Stripe API call failed"
            );
            return Err(BillingError::StripeApi(format!(
                "Stripe API error ({}): {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BillingError::StripeApi(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Charge a one-off amount: invoice item, invoice, finalize.
    ///
    /// Returns the finalized invoice with its hosted payment URL.
    pub async fn charge_amount(
        &self,
        customer_id: &str,
        amount_cents: i64,
        description: &str,
    ) -> BillingResult<FinalizedInvoice> {
        let amount = amount_cents.to_string();

        self.post_form(
            "invoiceitems",
            &[
                ("customer", customer_id),
                ("amount", &amount),
                ("currency", "usd"),
                ("description", description),
            ],
        )
        .await?;

        let invoice = self
            .post_form(
                "invoices",
                &[
                    ("customer", customer_id),
                    ("collection_method", "charge_automatically"),
                    ("auto_advance", "false"),
                ],
            )
            .await?;

        let invoice_id = invoice["id"]
            .as_str()
            .ok_or_else(|| BillingError::StripeApi("invoice response missing id".to_string()))?
            .to_string();

        let finalized = self
            .post_form(&format!("invoices/{}/finalize", invoice_id), &[])
            .await?;

        let hosted_invoice_url = finalized["hosted_invoice_url"]
            .as_str()
            .map(|s| s.to_string());
        let amount_due_cents = finalized["amount_due"].as_i64().unwrap_or(amount_cents);

        tracing::info!(
            customer_id = %customer_id,
            invoice_id = %invoice_id,
            amount_due_cents = amount_due_cents,
            "Finalized invoice"
        );

        Ok(FinalizedInvoice {
            invoice_id,
            hosted_invoice_url,
            amount_due_cents,
        })
    }
}
