//! Lazy value streams and the two combinators every expression is built from.
//!
//! A stream is a boxed iterator of `RuntimeResult` items. An `Err` item is the
//! terminal failure marker: the combinators here stop pulling from their inputs
//! once one has been produced, so items delivered before the failure stay valid
//! and nothing after it is computed.

use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Value,
};
use std::iter;

pub type Stream<'a, T> = Box<dyn Iterator<Item = RuntimeResult<T>> + 'a>;
pub type ValueStream<'a> = Stream<'a, Value>;

pub fn once<'a, T: 'a>(value: T) -> Stream<'a, T> {
    Box::new(iter::once(Ok(value)))
}

pub fn empty<'a, T: 'a>() -> Stream<'a, T> {
    Box::new(iter::empty())
}

pub fn fail<'a, T: 'a>(error: RuntimeError) -> Stream<'a, T> {
    Box::new(iter::once(Err(error)))
}

pub fn from_result<'a, T: 'a>(result: RuntimeResult<T>) -> Stream<'a, T> {
    Box::new(iter::once(result))
}

pub fn from_values<'a>(values: Vec<Value>) -> ValueStream<'a> {
    Box::new(values.into_iter().map(Ok))
}

/// Every item of `left`, then every item of `right`. `right` is not built until
/// `left` is exhausted.
pub fn concat<'a, T: 'a, F>(left: Stream<'a, T>, right: F) -> Stream<'a, T>
where
    F: FnOnce() -> Stream<'a, T> + 'a,
{
    terminating(Box::new(left.chain(iter::once_with(right).flatten())))
}

/// Flat-map: for each value of `upstream`, in order, every item of `f(value)`.
pub fn pipe<'a, U: 'a, T: 'a, F>(upstream: Stream<'a, U>, mut f: F) -> Stream<'a, T>
where
    F: FnMut(U) -> Stream<'a, T> + 'a,
{
    terminating(Box::new(upstream.flat_map(move |item| match item {
        Ok(value) => f(value),
        Err(err) => fail(err),
    })))
}

/// Stops after the first `Err` item. The inner stream is dropped right away so a
/// deep chain of failed calls unwinds one level at a time.
pub fn terminating<'a, T: 'a>(inner: Stream<'a, T>) -> Stream<'a, T> {
    Box::new(Terminating { inner: Some(inner) })
}

struct Terminating<'a, T> {
    inner: Option<Stream<'a, T>>,
}

impl<'a, T> Iterator for Terminating<'a, T> {
    type Item = RuntimeResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next();
        if matches!(item, Some(Err(_))) {
            self.inner = None;
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(inner) => (0, inner.size_hint().1),
            None => (0, Some(0)),
        }
    }
}

/// Red zone left on the native stack before pulling switches to a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Pulls `inner` on a stack that grows on demand. Wraps every stream whose pull
/// can nest without bound, such as function bodies and closure references.
pub fn growing<'a, T: 'a>(inner: Stream<'a, T>) -> Stream<'a, T> {
    Box::new(Growing { inner })
}

struct Growing<'a, T> {
    inner: Stream<'a, T>,
}

impl<'a, T> Iterator for Growing<'a, T> {
    type Item = RuntimeResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let inner = &mut self.inner;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || inner.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
