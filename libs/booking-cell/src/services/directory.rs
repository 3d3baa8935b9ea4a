// libs/booking-cell/src/services/directory.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{AvailabilityWindow, BookingError, Expert};

const EXPERTS_TABLE: &str = "experts";
const AVAILABILITY_TABLE: &str = "expert_availabilities";

/// Read-only view of expert profiles and their weekly availability.
#[async_trait]
pub trait ExpertDirectory: Send + Sync {
    async fn get_expert(&self, expert_id: Uuid) -> Result<Option<Expert>, BookingError>;

    /// Expert profile owned by an account, if the account is an expert.
    async fn get_expert_by_user(&self, user_id: Uuid) -> Result<Option<Expert>, BookingError>;

    async fn get_availability(&self, expert_id: Uuid) -> Result<Vec<AvailabilityWindow>, BookingError>;
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryExpertDirectory {
    experts: RwLock<HashMap<Uuid, Expert>>,
    windows: RwLock<Vec<AvailabilityWindow>>,
}

impl InMemoryExpertDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_expert(&self, expert: Expert) {
        self.experts.write().await.insert(expert.id, expert);
    }

    pub async fn add_window(&self, window: AvailabilityWindow) {
        self.windows.write().await.push(window);
    }
}

#[async_trait]
impl ExpertDirectory for InMemoryExpertDirectory {
    async fn get_expert(&self, expert_id: Uuid) -> Result<Option<Expert>, BookingError> {
        Ok(self.experts.read().await.get(&expert_id).cloned())
    }

    async fn get_expert_by_user(&self, user_id: Uuid) -> Result<Option<Expert>, BookingError> {
        Ok(self
            .experts
            .read()
            .await
            .values()
            .find(|e| e.user_id == user_id)
            .cloned())
    }

    async fn get_availability(&self, expert_id: Uuid) -> Result<Vec<AvailabilityWindow>, BookingError> {
        Ok(self
            .windows
            .read()
            .await
            .iter()
            .filter(|w| w.expert_id == expert_id)
            .cloned()
            .collect())
    }
}

// ==============================================================================
// POSTGREST
// ==============================================================================

pub struct PostgrestExpertDirectory {
    supabase: Arc<SupabaseClient>,
}

impl PostgrestExpertDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl ExpertDirectory for PostgrestExpertDirectory {
    async fn get_expert(&self, expert_id: Uuid) -> Result<Option<Expert>, BookingError> {
        Ok(self
            .supabase
            .select_one(EXPERTS_TABLE, &format!("id=eq.{}&select=id,user_id,fees_per_hr", expert_id))
            .await?)
    }

    async fn get_expert_by_user(&self, user_id: Uuid) -> Result<Option<Expert>, BookingError> {
        Ok(self
            .supabase
            .select_one(EXPERTS_TABLE, &format!("user_id=eq.{}&select=id,user_id,fees_per_hr", user_id))
            .await?)
    }

    async fn get_availability(&self, expert_id: Uuid) -> Result<Vec<AvailabilityWindow>, BookingError> {
        Ok(self
            .supabase
            .select(
                AVAILABILITY_TABLE,
                &format!("expert_id=eq.{}&order=start_time.asc", expert_id),
            )
            .await?)
    }
}
