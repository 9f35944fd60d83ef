use crate::error::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::entities::conversation;
use crate::entities::message::{self, Column as MsgCol, Entity as MsgEntity};
use crate::store::DeskStore;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

// How far back to look for the latest user/assistant pair.
const EXCHANGE_LOOKBACK: u64 = 20;

/// The most recent user message of a conversation and the assistant reply
/// to it, if one has been produced yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationExchange {
    pub user_message: Option<String>,
    pub assistant_answer: Option<String>,
}

impl DeskStore {
    pub async fn insert_conversation(
        &self,
        tenant_id: &str,
        session_id: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now().fixed_offset();
        let am = conversation::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            tenant_id: Set(tenant_id.to_string()),
            session_id: Set(session_id.map(str::to_string)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model.id)
    }

    pub async fn insert_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<String> {
        let am = message::ActiveModel {
            id: Set(relaydesk_common::id::next_id()),
            conversation_id: Set(conversation_id.to_string()),
            role: Set(role.to_string()),
            content: Set(content.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        Ok(model.id)
    }

    pub async fn latest_exchange(&self, conversation_id: &str) -> Result<ConversationExchange> {
        let recent = MsgEntity::find()
            .filter(MsgCol::ConversationId.eq(conversation_id))
            .filter(MsgCol::Role.is_in([ROLE_USER, ROLE_ASSISTANT]))
            .order_by(MsgCol::CreatedAt, Order::Desc)
            .order_by(MsgCol::Id, Order::Desc)
            .limit(EXCHANGE_LOOKBACK)
            .all(self.db())
            .await?;

        // Newest first: an assistant reply only counts when it comes after
        // the latest user message.
        let mut exchange = ConversationExchange::default();
        for m in recent {
            if m.content.trim().is_empty() {
                continue;
            }
            if m.role == ROLE_USER {
                exchange.user_message = Some(m.content);
                break;
            }
            if exchange.assistant_answer.is_none() {
                exchange.assistant_answer = Some(m.content);
            }
        }
        Ok(exchange)
    }
}
