use jv_classpath::{PrimitiveType, OBJECT_CLASS};
use jv_isolation::ClassView;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet, VecDeque};

/// Direct supertypes of platform classes that may be absent from the view
/// when no runtime image is indexed.
static PLATFORM_SUPERTYPES: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        let number: &[&str] = &["java.lang.Number", "java.lang.Comparable"];
        HashMap::from([
            ("java.lang.Object", &[][..]),
            (
                "java.lang.String",
                &["java.lang.CharSequence", "java.lang.Comparable", "java.io.Serializable"][..],
            ),
            ("java.lang.CharSequence", &[][..]),
            ("java.lang.Comparable", &[][..]),
            ("java.io.Serializable", &[][..]),
            ("java.lang.Number", &["java.io.Serializable"][..]),
            ("java.lang.Boolean", &["java.io.Serializable", "java.lang.Comparable"][..]),
            ("java.lang.Character", &["java.io.Serializable", "java.lang.Comparable"][..]),
            ("java.lang.Byte", number),
            ("java.lang.Short", number),
            ("java.lang.Integer", number),
            ("java.lang.Long", number),
            ("java.lang.Float", number),
            ("java.lang.Double", number),
            ("java.lang.Enum", &["java.lang.Comparable", "java.io.Serializable"][..]),
            ("java.lang.Iterable", &[][..]),
            ("java.util.Collection", &["java.lang.Iterable"][..]),
            ("java.util.List", &["java.util.Collection"][..]),
            ("java.util.Set", &["java.util.Collection"][..]),
            ("java.util.Map", &[][..]),
            ("java.util.Optional", &[][..]),
            ("java.util.ArrayList", &["java.util.List"][..]),
            ("java.util.LinkedHashSet", &["java.util.Set"][..]),
            ("java.util.LinkedHashMap", &["java.util.Map"][..]),
        ])
    });

/// Subtype queries over the selected class view.
#[derive(Clone, Copy)]
pub struct TypeHierarchy<'a> {
    view: &'a ClassView,
}

impl<'a> TypeHierarchy<'a> {
    pub fn new(view: &'a ClassView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &'a ClassView {
        self.view
    }

    /// Superclass first, then interfaces, in declaration order.
    pub fn direct_supertypes(&self, class: &str) -> Vec<String> {
        if let Some(record) = self.view.lookup(class) {
            let stub = &record.class;
            let mut supers = Vec::with_capacity(stub.interfaces.len() + 1);
            if let Some(super_class) = &stub.super_class {
                supers.push(super_class.clone());
            }
            supers.extend(stub.interfaces.iter().cloned());
            return supers;
        }
        PLATFORM_SUPERTYPES
            .get(class)
            .map(|supers| supers.iter().map(|name| name.to_string()).collect())
            .unwrap_or_default()
    }

    /// Breadth-first supertype walk starting with `class` itself.
    pub fn linearize(&self, class: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([class.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.direct_supertypes(&current));
            order.push(current);
        }
        order
    }

    /// Superclass chain, then every interface reachable from it.
    pub fn member_lookup_order(&self, class: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(class.to_string());
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                break;
            }
            cursor = self
                .view
                .lookup(&current)
                .and_then(|record| record.class.super_class.clone());
            chain.push(current);
        }

        let mut interfaces = Vec::new();
        let mut queue: VecDeque<String> = chain
            .iter()
            .filter_map(|class| self.view.lookup(class))
            .flat_map(|record| record.class.interfaces.iter().cloned())
            .collect();
        while let Some(interface) = queue.pop_front() {
            if !seen.insert(interface.clone()) {
                continue;
            }
            if let Some(record) = self.view.lookup(&interface) {
                queue.extend(record.class.interfaces.iter().cloned());
            }
            interfaces.push(interface);
        }
        chain.extend(interfaces);
        chain
    }

    /// Number of inheritance steps from `sub` up to `sup`, if assignable.
    pub fn distance(&self, sub: &str, sup: &str) -> Option<u32> {
        if sub == sup {
            return Some(0);
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(sub.to_string(), 0u32)]);
        let mut deepest = 0;
        while let Some((current, depth)) = queue.pop_front() {
            if current == sup {
                return Some(depth);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            deepest = deepest.max(depth);
            for parent in self.direct_supertypes(&current) {
                queue.push_back((parent, depth + 1));
            }
        }
        // Every reference type, interfaces included, is assignable to Object.
        (sup == OBJECT_CLASS).then_some(deepest + 1)
    }

    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        self.distance(sub, sup).is_some()
    }

    pub fn is_enum(&self, class: &str) -> bool {
        self.view
            .lookup(class)
            .map_or(false, |record| record.class.is_enum())
    }

    pub fn enum_constants(&self, class: &str) -> &'a [String] {
        self.view
            .lookup(class)
            .map(|record| record.class.enum_constants.as_slice())
            .unwrap_or(&[])
    }

    /// Whether a boxed `primitive` can be passed where `class` is expected.
    pub fn accepts_boxed(&self, class: &str, primitive: PrimitiveType) -> Option<u32> {
        self.distance(primitive.wrapper_class(), class)
    }
}
