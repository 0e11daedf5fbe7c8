//! Page requests, sorting and page results.

use ormrepo_proto::{OrderDirection, OrderSpec};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{Error, Result};

/// An ordered list of sort keys, primary first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    orders: Vec<OrderSpec>,
}

impl Sort {
    /// No ordering.
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Ascending on one property.
    pub fn by(field: impl Into<String>) -> Self {
        Self {
            orders: vec![OrderSpec::asc(field)],
        }
    }

    /// Descending on one property.
    pub fn by_desc(field: impl Into<String>) -> Self {
        Self {
            orders: vec![OrderSpec::desc(field)],
        }
    }

    /// Append the keys of `other` as lower-priority keys.
    pub fn and(mut self, other: Sort) -> Self {
        self.orders.extend(other.orders);
        self
    }

    pub fn orders(&self) -> &[OrderSpec] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    /// Parse request parameters of the form `prop[,asc|desc]`.
    ///
    /// `"age,desc"` sorts by age descending; `"username,age"` sorts both
    /// ascending; `"username,age,desc"` applies the direction to both.
    pub fn parse_params<I, S>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sort = Sort::unsorted();
        for param in params {
            let parts: Vec<&str> = param
                .as_ref()
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            let (direction, fields) = match parts.split_last() {
                Some((last, rest)) if !rest.is_empty() => match OrderDirection::parse(last) {
                    Some(direction) => (direction, rest),
                    None => (OrderDirection::Asc, parts.as_slice()),
                },
                _ => (OrderDirection::Asc, parts.as_slice()),
            };
            for field in fields {
                if OrderDirection::parse(field).is_some() {
                    return Err(Error::invalid_argument(format!(
                        "sort '{}' has no property",
                        param.as_ref()
                    )));
                }
                sort.orders.push(OrderSpec {
                    field: field.to_string(),
                    direction,
                });
            }
        }
        Ok(sort)
    }
}

impl From<Vec<OrderSpec>> for Sort {
    fn from(orders: Vec<OrderSpec>) -> Self {
        Self { orders }
    }
}

/// A zero-based page index, a page size and an ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    /// A page request without ordering.
    ///
    /// A page size below one or a negative index is an invalid argument.
    pub fn of(page: i64, size: i64) -> Result<Self> {
        Self::of_sorted(page, size, Sort::unsorted())
    }

    /// A page request with ordering.
    pub fn of_sorted(page: i64, size: i64, sort: Sort) -> Result<Self> {
        if size < 1 {
            return Err(Error::invalid_argument(format!(
                "page size must not be less than one, got {}",
                size
            )));
        }
        if page < 0 {
            return Err(Error::invalid_argument(format!(
                "page index must not be negative, got {}",
                page
            )));
        }
        let page = u32::try_from(page)
            .map_err(|_| Error::invalid_argument(format!("page index {} is too large", page)))?;
        let size = u32::try_from(size)
            .map_err(|_| Error::invalid_argument(format!("page size {} is too large", size)))?;
        Ok(Self { page, size, sort })
    }

    /// Replace the ordering.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }

    /// The request for the following page.
    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }
}

/// One page of results with the total element count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    total_elements: u64,
    sort: Sort,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
            sort: request.sort().clone(),
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    /// `ceil(total_elements / size)`.
    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(self.size as u64)
    }

    /// Zero-based index of this page.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn has_next(&self) -> bool {
        (self.number as u64 + 1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Convert the content, keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            sort: self.sort,
        }
    }

    /// Fallible [`Page::map`].
    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<_>>()?,
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            sort: self.sort,
        })
    }
}

impl<T: Serialize> Serialize for Page<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut page = serializer.serialize_struct("Page", 12)?;
        page.serialize_field("content", &self.content)?;
        page.serialize_field("totalElements", &self.total_elements)?;
        page.serialize_field("totalPages", &self.total_pages())?;
        page.serialize_field("number", &self.number)?;
        page.serialize_field("size", &self.size)?;
        page.serialize_field("numberOfElements", &self.number_of_elements())?;
        page.serialize_field("first", &self.is_first())?;
        page.serialize_field("last", &self.is_last())?;
        page.serialize_field("hasNext", &self.has_next())?;
        page.serialize_field("hasPrevious", &self.has_previous())?;
        page.serialize_field("empty", &self.content.is_empty())?;
        page.serialize_field("sort", &self.sort.orders)?;
        page.end()
    }
}

/// A page of results that only knows whether another page follows.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    has_next: bool,
    sort: Sort,
}

impl<T> Slice<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, has_next: bool) -> Self {
        Self {
            content,
            number: request.page(),
            size: request.size(),
            has_next,
            sort: request.sort().clone(),
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
            sort: self.sort,
        }
    }

    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Slice<U>> {
        Ok(Slice {
            content: self.content.into_iter().map(f).collect::<Result<_>>()?,
            number: self.number,
            size: self.size,
            has_next: self.has_next,
            sort: self.sort,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_rejects_bad_arguments() {
        assert!(matches!(PageRequest::of(0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(PageRequest::of(0, -3), Err(Error::InvalidArgument(_))));
        assert!(matches!(PageRequest::of(-1, 10), Err(Error::InvalidArgument(_))));
        assert_eq!(PageRequest::of(2, 10).unwrap().offset(), 20);
    }

    #[test]
    fn test_page_arithmetic() {
        for (total, size, expected_pages) in [(0u64, 3i64, 0u64), (5, 3, 2), (6, 3, 2), (7, 3, 3), (1, 1, 1)] {
            for index in 0..4i64 {
                let request = PageRequest::of(index, size).unwrap();
                let page: Page<()> = Page::new(Vec::new(), &request, total);
                assert_eq!(page.total_pages(), expected_pages);
                assert_eq!(page.has_next(), (index as u64 + 1) < expected_pages);
                assert_eq!(page.is_first(), index == 0);
            }
        }
    }

    #[test]
    fn test_page_serializes_metadata() {
        let request = PageRequest::of_sorted(0, 3, Sort::by_desc("username")).unwrap();
        let page = Page::new(vec!["memberE", "memberD", "memberC"], &request, 5);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalElements"], 5);
        assert_eq!(json["totalPages"], 2);
        assert_eq!(json["number"], 0);
        assert_eq!(json["first"], true);
        assert_eq!(json["hasNext"], true);
        assert_eq!(json["content"][0], "memberE");
        assert_eq!(json["sort"][0]["direction"], "DESC");
    }

    #[test]
    fn test_map_keeps_metadata() {
        let request = PageRequest::of(1, 2).unwrap();
        let page = Page::new(vec![1, 2], &request, 5).map(|n| n * 10);
        assert_eq!(page.content(), &[10, 20]);
        assert_eq!(page.number(), 1);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_previous());
    }

    #[test]
    fn test_sort_params() {
        let sort = Sort::parse_params(["age,desc", "username"]).unwrap();
        assert_eq!(
            sort.orders(),
            &[OrderSpec::desc("age"), OrderSpec::asc("username")]
        );
        let sort = Sort::parse_params(["username,age,DESC"]).unwrap();
        assert_eq!(
            sort.orders(),
            &[OrderSpec::desc("username"), OrderSpec::desc("age")]
        );
        assert!(Sort::parse_params(["desc"]).is_err());
        assert!(Sort::parse_params(Vec::<String>::new()).unwrap().is_unsorted());
    }

    #[test]
    fn test_sort_and() {
        let sort = Sort::by("age").and(Sort::by_desc("username"));
        assert_eq!(sort.orders().len(), 2);
    }
}
