//! Scan pipeline for ContextPack.
//!
//! - [`extractor`]: field-by-field extraction over normalized pages
//! - [`assembler`]: v0 pack construction, IDs, company names, summaries
//! - [`demo`]: canned inputs for demo mode
//! - [`pipeline`]: request validation and the [`ScanOrchestrator`]

pub mod assembler;
pub mod demo;
pub mod extractor;
pub mod pipeline;
pub mod progress;

pub use assembler::{assemble, build_summary, company_name_from_url, pack_id, slugify};
pub use demo::{CannedDemoData, DemoDataProvider};
pub use extractor::{Extraction, Extractor, FieldTask, SourcePage, prepare_pages};
pub use pipeline::{
    ErrorBody, HttpReply, ScanOrchestrator, ScanOutcome, ScanRequest, ScanResponse, ValidScan,
};
pub use progress::{ScanPhase, ScanProgress, SilentProgress};

#[cfg(test)]
pub(crate) mod testing {
    //! In-process doubles for the model backend and pack store.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use contextpack_llm::{LlmBackend, LlmPrompt};
    use contextpack_shared::{ContextPack, ContextPackError, Result, ScrapedPage};
    use contextpack_storage::PackStore;
    use serde_json::{Value, json};

    use crate::progress::{ScanPhase, ScanProgress};

    type Handler = Box<dyn Fn(&LlmPrompt) -> Result<Value> + Send + Sync>;

    /// Backend answering from a closure and recording every prompt.
    pub struct ScriptedBackend {
        handler: Handler,
        calls: AtomicUsize,
        prompts: Mutex<Vec<LlmPrompt>>,
    }

    impl ScriptedBackend {
        pub fn new(handler: impl Fn(&LlmPrompt) -> Result<Value> + Send + Sync + 'static) -> Self {
            Self {
                handler: Box::new(handler),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompt_for(&self, name: &str) -> Option<LlmPrompt> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.name == name)
                .cloned()
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, prompt: &LlmPrompt, _schema: &Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            (self.handler)(prompt)
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn fact(content: &str, confidence: f64, source: u32) -> Value {
        json!({
            "content": content,
            "confidence": confidence,
            "reason": "stated on the page",
            "sources": [source],
            "excerpt": content,
        })
    }

    /// Plausible answers for every field task.
    pub fn canned_answer(prompt: &LlmPrompt) -> Result<Value> {
        let answer = match prompt.name.as_str() {
            "vision" => {
                let mut v = fact("Books that close themselves", 0.6, 1);
                v["found"] = json!(true);
                v
            }
            "mission" => {
                let mut v = fact("Make month-end boring", 0.9, 1);
                v["found"] = json!(true);
                v
            }
            "pricingModel" => {
                let mut v = fact("Per-seat subscription", 0.5, 1);
                v["found"] = json!(true);
                v
            }
            "values" => json!({"items": [fact("Candor", 0.7, 2), fact("Ownership", 0.7, 2)]}),
            "revenueDrivers" => json!({"items": [fact("Subscriptions", 0.6, 1)]}),
            "jobsToBeDone" => json!({"items": [fact("Close the books in a day", 0.8, 1)]}),
            "keyFeatures" => json!({"items": [fact("Automated reconciliation", 0.8, 1)]}),
            "icpSegments" => json!({"segments": [{
                "name": "Finance teams",
                "description": "Mid-market controllers",
                "confidence": 0.8,
                "reason": "hero copy",
                "sources": [1],
                "excerpt": "",
            }]}),
            other => {
                return Err(ContextPackError::Provider(format!("unexpected task {other}")));
            }
        };
        Ok(answer)
    }

    /// Progress reporter remembering every phase change.
    #[derive(Default)]
    pub struct RecordingProgress {
        phases: Mutex<Vec<ScanPhase>>,
    }

    impl RecordingProgress {
        pub fn phases(&self) -> Vec<ScanPhase> {
            self.phases.lock().unwrap().clone()
        }
    }

    impl ScanProgress for RecordingProgress {
        fn phase(&self, phase: ScanPhase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn page_fetched(&self, _page: &ScrapedPage, _current: usize, _total: usize) {}

        fn field_extracted(&self, _field: &str, _current: usize, _total: usize) {}
    }

    /// Store keeping saved packs in memory.
    #[derive(Default)]
    pub struct RecordingStore {
        pub saved: Mutex<Vec<ContextPack>>,
    }

    #[async_trait::async_trait]
    impl PackStore for RecordingStore {
        async fn save_context_pack(&self, pack: &ContextPack) -> Result<()> {
            self.saved.lock().unwrap().push(pack.clone());
            Ok(())
        }

        async fn get_context_pack(&self, id: &str) -> Result<Option<ContextPack>> {
            Ok(self.saved.lock().unwrap().iter().find(|p| p.id == id).cloned())
        }

        async fn delete_context_pack(&self, id: &str) -> Result<()> {
            let mut saved = self.saved.lock().unwrap();
            let before = saved.len();
            saved.retain(|p| p.id != id);
            if saved.len() == before {
                return Err(ContextPackError::NotFound(id.to_string()));
            }
            Ok(())
        }
    }

    /// Store whose writes always fail.
    pub struct FailingStore;

    #[async_trait::async_trait]
    impl PackStore for FailingStore {
        async fn save_context_pack(&self, _pack: &ContextPack) -> Result<()> {
            Err(ContextPackError::Storage("disk full".into()))
        }

        async fn get_context_pack(&self, _id: &str) -> Result<Option<ContextPack>> {
            Ok(None)
        }

        async fn delete_context_pack(&self, id: &str) -> Result<()> {
            Err(ContextPackError::NotFound(id.to_string()))
        }
    }
}
