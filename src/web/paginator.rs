use std::num::IntErrorKind;

use serde::Serialize;


/// Splits a listing of `count` items into pages of `per_page` items.
#[derive(Clone, Copy, Debug)]
pub struct Paginator {
	count: u64,
	per_page: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
	/// 1-based page number
	pub number: u64,
	pub num_pages: u64,
	pub count: u64,
	pub has_next: bool,
	pub has_previous: bool,
	pub next_page_number: Option<u64>,
	pub previous_page_number: Option<u64>,
	#[serde(skip)]
	pub offset: u64,
	#[serde(skip)]
	pub limit: u64,
}


impl Paginator {
	pub fn new(count: u64, per_page: u64) -> Self {
		debug_assert!(per_page > 0, "page size must be at least 1");
		Self {
			count,
			per_page: per_page.max(1),
		}
	}

	/// The number of pages. An empty listing still has one (empty) page.
	pub fn num_pages(&self) -> u64 {
		if self.count == 0 {
			1
		} else {
			(self.count + self.per_page - 1) / self.per_page
		}
	}

	/// Finds the page with the requested number. A missing or unreadable
	/// number gives the first page, and numbers out of range are clamped.
	pub fn get_page(&self, number: Option<&str>) -> Page {
		let num_pages = self.num_pages();
		let number = match number.map(|n| n.trim().parse::<i64>()) {
			Some(Ok(n)) if n > num_pages as i64 => num_pages,
			Some(Ok(n)) if n >= 1 => n as u64,
			Some(Err(e)) if *e.kind() == IntErrorKind::PosOverflow => num_pages,
			_ => 1,
		};

		let offset = (number - 1) * self.per_page;
		Page {
			number,
			num_pages,
			count: self.count,
			has_next: number < num_pages,
			has_previous: number > 1,
			next_page_number: if number < num_pages { Some(number + 1) } else { None },
			previous_page_number: if number > 1 { Some(number - 1) } else { None },
			offset,
			limit: self.per_page,
		}
	}
}
