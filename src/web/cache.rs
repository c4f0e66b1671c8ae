use std::time::Duration;

use moka::future::Cache;


/// Identifies a cached page: the user viewing it (if logged in) and the page
/// query parameter.
pub type PageKey = (Option<i64>, Option<String>);

/// Keeps rendered pages around for a short while, holding at most `limit`
/// pages.
#[derive(Clone)]
pub struct PageCache {
	inner: Cache<PageKey, String>,
	enabled: bool,
}


impl PageCache {
	/// A zero `lifetime` disables the cache.
	pub fn new(limit: usize, lifetime: Duration) -> Self {
		let enabled = lifetime > Duration::ZERO;
		let mut builder = Cache::builder().max_capacity(limit as u64);
		if enabled {
			builder = builder.time_to_live(lifetime);
		}
		Self {
			inner: builder.build(),
			enabled,
		}
	}

	pub fn clear(&self) { self.inner.invalidate_all(); }

	/// Returns the cached page, unless it has expired.
	pub async fn find(&self, key: &PageKey) -> Option<String> {
		if !self.enabled {
			return None;
		}
		self.inner.get(key).await
	}

	pub async fn insert(&self, key: PageKey, html: String) {
		if self.enabled {
			self.inner.insert(key, html).await;
		}
	}

	pub fn is_enabled(&self) -> bool { self.enabled }
}


#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_entries_expire() {
		let cache = PageCache::new(10, Duration::from_millis(100));
		let key = (None, None);
		cache.insert(key.clone(), "page".to_string()).await;
		assert_eq!(cache.find(&key).await, Some("page".to_string()));

		tokio::time::sleep(Duration::from_millis(200)).await;
		assert_eq!(cache.find(&key).await, None);
	}

	#[tokio::test]
	async fn test_pages_are_kept_per_viewer() {
		let cache = PageCache::new(10, Duration::from_secs(20));
		cache.insert((None, None), "anonymous".to_string()).await;
		cache.insert((Some(1), None), "user 1".to_string()).await;
		cache
			.insert((Some(1), Some("2".to_string())), "user 1, page 2".to_string())
			.await;

		assert_eq!(cache.find(&(None, None)).await, Some("anonymous".to_string()));
		assert_eq!(cache.find(&(Some(1), None)).await, Some("user 1".to_string()));
		assert_eq!(cache.find(&(Some(2), None)).await, None);

		cache.clear();
		assert_eq!(cache.find(&(None, None)).await, None);
	}

	#[tokio::test]
	async fn test_size_is_bounded() {
		let cache = PageCache::new(2, Duration::from_secs(20));
		for id in 0..10 {
			cache.insert((Some(id), None), id.to_string()).await;
		}
		cache.inner.run_pending_tasks().await;
		assert!(cache.inner.entry_count() <= 2);
	}

	#[tokio::test]
	async fn test_zero_lifetime_disables_caching() {
		let cache = PageCache::new(10, Duration::ZERO);
		assert!(!cache.is_enabled());
		cache.insert((None, None), "page".to_string()).await;
		assert_eq!(cache.find(&(None, None)).await, None);
	}
}
