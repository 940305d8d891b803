use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;

/// Owns the long running tasks and the shutdown token they all watch.
pub struct Supervisor {
	pub shutdown: CancellationToken,
	pub tasks: JoinSet<Result<()>>,
}

impl Supervisor {
	pub fn new() -> Self {
		Self {
			shutdown: CancellationToken::new(),
			tasks: JoinSet::new(),
		}
	}

	pub fn token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	pub fn spawn<F>(&mut self, fut: F)
	where
		F: Future<Output = Result<()>> + Send + 'static,
	{
		self.tasks.spawn(fut);
	}

	/// Cancels the token on Ctrl-C or, when given, after `run_time`.
	pub fn cancel_on_signal(&mut self, run_time: Option<Duration>) {
		let token = self.token();
		self.tasks.spawn(async move {
			let timer = async {
				match run_time {
					Some(run_time) => tokio::time::sleep(run_time).await,
					None => std::future::pending::<()>().await,
				}
			};

			tokio::select! {
				_ = token.cancelled() => {}
				res = tokio::signal::ctrl_c() => {
					res?;
					info!("Ctrl-C received, shutting down");
				}
				_ = timer => info!("run time elapsed, shutting down"),
			}

			token.cancel();
			Ok::<(), crate::Error>(())
		});
	}

	pub async fn shutdown(mut self) -> Result<()> {
		info!("Supervisor shutdown starting");
		self.shutdown.cancel();

		while let Some(res) = self.tasks.join_next().await {
			res??;
		}
		info!("Supervisor shutdown complete");

		Ok(())
	}
}
