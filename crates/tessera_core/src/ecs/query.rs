//! # Queries
//!
//! A query names the fields an iteration touches and how: `&T` reads,
//! `&mut T` writes, tuples combine them. Binding a query to a storage
//! casts each requested column once; iteration then walks the typed
//! slices directly with no per-record lookups.

use std::any::{type_name, TypeId};

use crate::ecs::field::{Field, FieldInfo, FieldType};
use crate::ecs::schema::SchemaId;
use crate::ecs::Entity;
use crate::error::{StoreError, StoreResult};
use crate::memory::ColumnBuffer;

/// How a query touches one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldAccess {
    /// The field type.
    pub ty: FieldType,
    /// Whether the field is written.
    pub mutable: bool,
}

enum ColumnRef<'r> {
    Shared(&'r ColumnBuffer),
    Unique(&'r mut ColumnBuffer),
}

/// Hands out each column of one storage at most once.
pub struct ColumnBinder<'r> {
    schema: SchemaId,
    fields: &'r [FieldInfo],
    columns: Vec<Option<ColumnRef<'r>>>,
    len: usize,
}

impl<'r> ColumnBinder<'r> {
    pub(crate) fn shared(
        schema: SchemaId,
        fields: &'r [FieldInfo],
        columns: &'r [ColumnBuffer],
        len: usize,
    ) -> Self {
        Self {
            schema,
            fields,
            columns: columns.iter().map(|c| Some(ColumnRef::Shared(c))).collect(),
            len,
        }
    }

    pub(crate) fn unique(
        schema: SchemaId,
        fields: &'r [FieldInfo],
        columns: &'r mut [ColumnBuffer],
        len: usize,
    ) -> Self {
        Self {
            schema,
            fields,
            columns: columns
                .iter_mut()
                .map(|c| Some(ColumnRef::Unique(c)))
                .collect(),
            len,
        }
    }

    fn take<T: Field>(&mut self) -> StoreResult<ColumnRef<'r>> {
        let type_id = TypeId::of::<T>();
        let index = self
            .fields
            .iter()
            .position(|f| f.ty.type_id == type_id)
            .ok_or(StoreError::FieldNotInSchema {
                field: type_name::<T>(),
                schema: self.schema,
            })?;
        self.columns[index]
            .take()
            .ok_or(StoreError::DuplicateField(type_name::<T>()))
    }

    /// Binds the column of `T` for reading.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a column or was already bound.
    pub fn slice<T: Field>(&mut self) -> StoreResult<&'r [T]> {
        let len = self.len;
        match self.take::<T>()? {
            ColumnRef::Shared(column) => column.as_slice(len),
            ColumnRef::Unique(column) => {
                let column: &'r ColumnBuffer = column;
                column.as_slice(len)
            }
        }
    }

    /// Binds the column of `T` for writing.
    ///
    /// # Errors
    ///
    /// Fails if `T` is not a column, was already bound, or the storage is
    /// only borrowed for reading.
    pub fn slice_mut<T: Field>(&mut self) -> StoreResult<&'r mut [T]> {
        let len = self.len;
        match self.take::<T>()? {
            ColumnRef::Unique(column) => column.as_mut_slice(len),
            ColumnRef::Shared(_) => Err(StoreError::ReadOnlyField(type_name::<T>())),
        }
    }
}

/// Fields fetched per record during iteration.
///
/// Implemented for `&T`, `&mut T` and tuples of queries up to eight
/// elements.
pub trait Query {
    /// What the callback receives for each record.
    type Item<'r>;
    /// Per-storage iteration state.
    type Cursor<'r>;

    /// Calls `visit` once per field touched, in declaration order.
    fn visit<V: FnMut(FieldAccess)>(visit: &mut V);

    /// Binds the query to one storage's columns.
    ///
    /// # Errors
    ///
    /// Fails if a field is missing, repeated, or needs write access the
    /// binder cannot give.
    fn bind<'r>(binder: &mut ColumnBinder<'r>) -> StoreResult<Self::Cursor<'r>>;

    /// Fetches the next record, moving from the last slot towards the first.
    fn next<'r>(cursor: &mut Self::Cursor<'r>) -> Option<Self::Item<'r>>;
}

/// Queries that only read, and can run through a shared borrow.
pub trait ReadOnlyQuery: Query {}

impl<T: Field> Query for &T {
    type Item<'r> = &'r T;
    type Cursor<'r> = std::slice::Iter<'r, T>;

    fn visit<V: FnMut(FieldAccess)>(visit: &mut V) {
        visit(FieldAccess {
            ty: FieldType::of::<T>(),
            mutable: false,
        });
    }

    fn bind<'r>(binder: &mut ColumnBinder<'r>) -> StoreResult<Self::Cursor<'r>> {
        Ok(binder.slice::<T>()?.iter())
    }

    #[inline]
    fn next<'r>(cursor: &mut Self::Cursor<'r>) -> Option<Self::Item<'r>> {
        cursor.next_back()
    }
}

impl<T: Field> ReadOnlyQuery for &T {}

impl<T: Field> Query for &mut T {
    type Item<'r> = &'r mut T;
    type Cursor<'r> = std::slice::IterMut<'r, T>;

    fn visit<V: FnMut(FieldAccess)>(visit: &mut V) {
        visit(FieldAccess {
            ty: FieldType::of::<T>(),
            mutable: true,
        });
    }

    fn bind<'r>(binder: &mut ColumnBinder<'r>) -> StoreResult<Self::Cursor<'r>> {
        Ok(binder.slice_mut::<T>()?.iter_mut())
    }

    #[inline]
    fn next<'r>(cursor: &mut Self::Cursor<'r>) -> Option<Self::Item<'r>> {
        cursor.next_back()
    }
}

macro_rules! impl_query {
    ($($name:ident),*) => {
        impl<$($name: Query),*> Query for ($($name,)*) {
            type Item<'r> = ($($name::Item<'r>,)*);
            type Cursor<'r> = ($($name::Cursor<'r>,)*);

            #[allow(unused_variables)]
            fn visit<V: FnMut(FieldAccess)>(visit: &mut V) {
                $( $name::visit(visit); )*
            }

            #[allow(unused_variables)]
            fn bind<'r>(binder: &mut ColumnBinder<'r>) -> StoreResult<Self::Cursor<'r>> {
                Ok(($($name::bind(binder)?,)*))
            }

            #[inline]
            #[allow(non_snake_case, unused_variables, clippy::unused_unit)]
            fn next<'r>(cursor: &mut Self::Cursor<'r>) -> Option<Self::Item<'r>> {
                let ($($name,)*) = cursor;
                Some(($($name::next($name)?,)*))
            }
        }

        impl<$($name: ReadOnlyQuery),*> ReadOnlyQuery for ($($name,)*) {}
    };
}

impl_query!();
impl_query!(A);
impl_query!(A, B);
impl_query!(A, B, C);
impl_query!(A, B, C, D);
impl_query!(A, B, C, D, E);
impl_query!(A, B, C, D, E, F);
impl_query!(A, B, C, D, E, F, G);
impl_query!(A, B, C, D, E, F, G, H);

/// Drives `f` over one storage, last slot first.
pub(crate) fn run_query<'r, Q, F>(
    entities: &'r [Entity],
    binder: &mut ColumnBinder<'r>,
    f: &mut F,
) -> StoreResult<()>
where
    Q: Query,
    F: FnMut(Entity, Q::Item<'r>),
{
    let mut cursor = Q::bind(binder)?;
    for &entity in entities.iter().rev() {
        let Some(item) = Q::next(&mut cursor) else {
            break;
        };
        f(entity, item);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::field::FieldId;

    fn info<T: Field>(index: usize) -> FieldInfo {
        FieldInfo {
            id: FieldId::new(index),
            ty: FieldType::of::<T>(),
        }
    }

    fn columns() -> (Vec<FieldInfo>, Vec<ColumnBuffer>) {
        let fields = vec![info::<u32>(0), info::<f64>(1)];
        let mut a = ColumnBuffer::with_capacity(4, 3);
        let mut b = ColumnBuffer::with_capacity(8, 3);
        for i in 0..3u32 {
            a.write(i as usize, i).unwrap();
            b.write(i as usize, f64::from(i) * 0.5).unwrap();
        }
        (fields, vec![a, b])
    }

    #[test]
    fn test_visit_reports_access() {
        let mut seen = Vec::new();
        <(&u32, &mut f64)>::visit(&mut |a: FieldAccess| seen.push((a.ty.name, a.mutable)));
        assert_eq!(seen, vec![("u32", false), ("f64", true)]);
    }

    #[test]
    fn test_run_query_reverse() {
        let (fields, mut cols) = columns();
        let entities: Vec<Entity> = (0..3).map(Entity::from_raw).collect();
        let mut binder = ColumnBinder::unique(SchemaId::new(0), &fields, &mut cols, 3);

        let mut seen = Vec::new();
        run_query::<(&u32, &mut f64), _>(&entities, &mut binder, &mut |e: Entity, (n, x): (&u32, &mut f64)| {
            *x += 1.0;
            seen.push((e.to_raw(), *n));
        })
        .unwrap();

        assert_eq!(seen, vec![(2, 2), (1, 1), (0, 0)]);
        assert_eq!(cols[1].as_slice::<f64>(3).unwrap(), &[1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_aliasing_rejected() {
        let (fields, mut cols) = columns();
        let mut binder = ColumnBinder::unique(SchemaId::new(0), &fields, &mut cols, 3);
        assert!(matches!(
            <(&u32, &mut u32)>::bind(&mut binder),
            Err(StoreError::DuplicateField("u32"))
        ));
    }

    #[test]
    fn test_shared_binder_is_read_only() {
        let (fields, cols) = columns();
        let mut binder = ColumnBinder::shared(SchemaId::new(0), &fields, &cols, 3);
        assert!(matches!(
            <&mut f64>::bind(&mut binder),
            Err(StoreError::ReadOnlyField("f64"))
        ));
    }

    #[test]
    fn test_missing_column() {
        let (fields, cols) = columns();
        let mut binder = ColumnBinder::shared(SchemaId::new(0), &fields, &cols, 3);
        assert!(matches!(
            <&i8>::bind(&mut binder),
            Err(StoreError::FieldNotInSchema { field: "i8", .. })
        ));
    }
}
