/// Declare a struct that rows can be decoded into.
///
/// Derives `Default` and implements [`GraphRecord`](crate::result::GraphRecord)
/// and [`FromValue`](crate::result::FromValue), so declared records nest
/// inside each other, in `Option`, `Vec` and `HashMap<String, _>`.
///
/// ```
/// graphtx::graph_record! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Person {
///         pub name: String,
///         pub age: i64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! graph_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $field_ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Default)]
        $vis struct $name {
            $( $(#[$field_meta])* $field_vis $field: $field_ty, )+
        }

        impl $crate::result::GraphRecord for $name {
            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),+];

            fn bind(
                &mut self,
                field: &str,
                value: $crate::core::Value,
            ) -> $crate::core::Result<()> {
                $(
                    if field == stringify!($field) {
                        self.$field = <$field_ty as $crate::result::FromValue>::from_value(value)?;
                        return Ok(());
                    }
                )+
                Ok(())
            }
        }

        impl $crate::result::FromValue for $name {
            fn from_value(value: $crate::core::Value) -> $crate::core::Result<Self> {
                <Self as $crate::result::GraphRecord>::from_tree(value)
            }
        }
    };
}
