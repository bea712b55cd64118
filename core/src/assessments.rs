use crate::api::AssessmentApi;
use crate::model::{Assessment, AssessmentForm, AssessmentUpdate};
use crate::polling::{Pollable, Poller};
use crate::store::{ObservableStore, StoreError, Subscription};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentState {
    pub assessments: Vec<Assessment>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Client-side mirror of the backend's assessment list.
pub struct AssessmentStore {
    api: Arc<dyn AssessmentApi>,
    state: ObservableStore<AssessmentState>,
    poller: Poller,
}

impl AssessmentStore {
    pub fn new(api: Arc<dyn AssessmentApi>) -> Self {
        Self {
            api,
            state: ObservableStore::default(),
            poller: Poller::new(),
        }
    }

    pub fn snapshot(&self) -> AssessmentState {
        self.state.snapshot()
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.state.subscribe(listener)
    }

    pub fn find(&self, id: &str) -> Option<Assessment> {
        self.state.read(|state| {
            state
                .assessments
                .iter()
                .find(|assessment| assessment.id == id)
                .cloned()
        })
    }

    pub async fn list(&self) -> Result<Vec<Assessment>, StoreError> {
        self.state.update(|state| state.is_loading = true);
        let result = self.api.list_assessments(&CancellationToken::new()).await;
        self.commit_list(result)
    }

    pub async fn create(&self, form: &AssessmentForm) -> Result<Assessment, StoreError> {
        let assessment = self.api.create_assessment(form).await?;
        info!(assessment_id = %assessment.id, name = %assessment.name, "assessment created");
        self.state
            .update(|state| state.assessments.push(assessment.clone()));
        Ok(assessment)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Assessment, StoreError> {
        let update = AssessmentUpdate {
            name: Some(name.to_string()),
        };
        let updated = self.api.update_assessment(id, &update).await?;
        self.state.update(|state| {
            match state.assessments.iter_mut().find(|entry| entry.id == updated.id) {
                Some(entry) => *entry = updated.clone(),
                None => state.assessments.push(updated.clone()),
            }
        });
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.api.delete_assessment(id).await?;
        info!(assessment_id = id, "assessment deleted");
        self.state
            .update(|state| state.assessments.retain(|entry| entry.id != id));
        Ok(())
    }

    fn commit_list(
        &self,
        result: Result<Vec<Assessment>, crate::api::ApiError>,
    ) -> Result<Vec<Assessment>, StoreError> {
        match result {
            Ok(assessments) => {
                self.state.set(AssessmentState {
                    assessments: assessments.clone(),
                    is_loading: false,
                    error: None,
                });
                Ok(assessments)
            }
            Err(err) => {
                self.state.update(|state| {
                    state.is_loading = false;
                    state.error = Some(err.to_string());
                });
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl Pollable for AssessmentStore {
    fn poller(&self) -> &Poller {
        &self.poller
    }

    async fn poll(&self, cancel: CancellationToken) -> Result<(), StoreError> {
        let result = self.api.list_assessments(&cancel).await;
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let count = self.commit_list(result)?.len();
        debug!(count, "assessments refreshed");
        Ok(())
    }
}
