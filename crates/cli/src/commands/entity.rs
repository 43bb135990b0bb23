use clap::{Subcommand, ValueEnum};
use procura_core::config::{AppConfig, LoadOptions};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::client::{ApiClient, Identity, RemoteRequest};
use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    CashRequest,
    SupplierApplication,
    Contract,
}

impl KindArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::CashRequest => "cash_request",
            Self::SupplierApplication => "supplier_application",
            Self::Contract => "contract",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DecisionArg {
    Approve,
    Reject,
}

#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    #[command(about = "List entities, optionally filtered by kind, status and owner")]
    List {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    #[command(about = "Show one entity as seen by the requester")]
    Show { id: String },
    #[command(about = "List entities whose active step is assigned to the requester")]
    Pending,
    #[command(about = "Open a new entity and resolve its approval chain")]
    Create {
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        amount: Option<Decimal>,
    },
    #[command(about = "Approve or reject the active approval step")]
    Decide {
        id: String,
        #[arg(long)]
        level: u32,
        #[arg(long, value_enum)]
        decision: DecisionArg,
        #[arg(long)]
        comments: Option<String>,
        #[arg(long)]
        approved_amount: Option<Decimal>,
    },
    #[command(about = "Record a disbursement tranche against an approved cash request")]
    Disburse {
        id: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Resubmit a rejected entity with changes")]
    Edit {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        amount: Option<Decimal>,
    },
    #[command(about = "Submit the post-disbursement justification")]
    Justify {
        id: String,
        #[arg(long)]
        notes: String,
    },
    #[command(about = "Delete an entity before its review has started")]
    Delete { id: String },
    #[command(about = "Show the audit trail of an entity")]
    Audit { id: String },
}

impl EntityCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "entity.list",
            Self::Show { .. } => "entity.show",
            Self::Pending => "entity.pending",
            Self::Create { .. } => "entity.create",
            Self::Decide { .. } => "entity.decide",
            Self::Disburse { .. } => "entity.disburse",
            Self::Edit { .. } => "entity.edit",
            Self::Justify { .. } => "entity.justify",
            Self::Delete { .. } => "entity.delete",
            Self::Audit { .. } => "entity.audit",
        }
    }

    pub fn into_request(self) -> RemoteRequest {
        match self {
            Self::List { kind, status, owner } => {
                RemoteRequest::new(Method::GET, "/api/v1/entities")
                    .with_query("kind", kind.map(|kind| kind.as_str().to_string()))
                    .with_query("status", status)
                    .with_query("owner", owner)
            }
            Self::Show { id } => RemoteRequest::new(Method::GET, entity_path(&id, "")),
            Self::Pending => RemoteRequest::new(Method::GET, "/api/v1/approvals/pending"),
            Self::Create { kind, title, description, amount } => {
                RemoteRequest::new(Method::POST, "/api/v1/entities").with_body(json!({
                    "kind": kind.as_str(),
                    "title": title,
                    "description": description,
                    "amountRequested": amount,
                }))
            }
            Self::Decide { id, level, decision, comments, approved_amount } => {
                let decision = match decision {
                    DecisionArg::Approve => "approve",
                    DecisionArg::Reject => "reject",
                };
                RemoteRequest::new(Method::POST, entity_path(&id, "/decision")).with_body(json!({
                    "level": level,
                    "decision": decision,
                    "comments": comments,
                    "approvedAmount": approved_amount,
                }))
            }
            Self::Disburse { id, amount, notes } => {
                RemoteRequest::new(Method::POST, entity_path(&id, "/disburse"))
                    .with_body(json!({ "amount": amount, "notes": notes }))
            }
            Self::Edit { id, reason, title, description, amount } => {
                let mut changes = Map::new();
                if let Some(title) = title {
                    changes.insert("title".to_string(), Value::String(title));
                }
                if let Some(description) = description {
                    changes.insert("description".to_string(), Value::String(description));
                }
                if let Some(amount) = amount {
                    changes.insert("amountRequested".to_string(), json!(amount));
                }
                RemoteRequest::new(Method::POST, entity_path(&id, "/edit"))
                    .with_body(json!({ "changes": changes, "reason": reason }))
            }
            Self::Justify { id, notes } => {
                RemoteRequest::new(Method::POST, entity_path(&id, "/justification"))
                    .with_body(json!({ "notes": notes, "attachments": [] }))
            }
            Self::Delete { id } => RemoteRequest::new(Method::DELETE, entity_path(&id, "")),
            Self::Audit { id } => RemoteRequest::new(Method::GET, entity_path(&id, "/audit")),
        }
    }
}

fn entity_path(id: &str, suffix: &str) -> String {
    format!("/api/v1/entities/{}{suffix}", id.trim())
}

pub struct RemoteOptions {
    pub user_id: String,
    pub role: String,
    pub base_url: Option<String>,
}

pub fn run(options: RemoteOptions, command: EntityCommand) -> CommandResult {
    let name = command.name();
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                name,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let base_url = options.base_url.unwrap_or_else(|| config.client.base_url.clone());
    let client = ApiClient::new(
        &base_url,
        config.auth.api_token.clone(),
        Identity { user_id: options.user_id, role: options.role },
    );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                name,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let request = command.into_request();
    match runtime.block_on(client.execute(&request)) {
        Ok(body) => CommandResult::data(name, body),
        Err(error) => {
            CommandResult::failure(name, error.class(), error.to_string(), error.exit_code())
        }
    }
}
