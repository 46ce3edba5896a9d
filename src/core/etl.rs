use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::RunMonitor;
use tokio::sync::Mutex;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: Mutex<RunMonitor>,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor: bool) -> Self {
        Self {
            pipeline,
            monitor: Mutex::new(RunMonitor::new(monitor)),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting FIPS resolution run");

        // Extract
        self.monitor.lock().await.start_phase();
        let dataset = self.pipeline.extract().await?;
        tracing::info!("📥 Extracted {} rows", dataset.len());
        self.monitor.lock().await.finish_phase("Extract");

        // Transform
        self.monitor.lock().await.start_phase();
        let result = self.pipeline.transform(dataset).await?;
        tracing::info!(
            "🔄 Resolved {}/{} unique locations ({} ambiguous)",
            result.report.resolved,
            result.report.unique_locations,
            result.report.ambiguous
        );
        self.monitor.lock().await.finish_phase("Transform");

        // Load
        self.monitor.lock().await.start_phase();
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("💾 Output saved to: {}", output_path);
        self.monitor.lock().await.finish_phase("Load");

        self.monitor.lock().await.log_final_stats();
        Ok(output_path)
    }
}
