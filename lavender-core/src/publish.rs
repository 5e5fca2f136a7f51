use std::fmt;

use lavender_index::Index;

use crate::{distributor::Distributor, docroot::Docroot, error::CoreResult, module::Module};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub changed: usize,
    pub total: usize,
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} files changed", self.changed, self.total)
    }
}

/// Hands every resource of `module` to `distributor`.
///
/// The md5 of a resource is taken from the module's cache when its content
/// id is unchanged, and computed from the content otherwise.
pub fn publish(module: &mut dyn Module, distributor: &mut Distributor) -> CoreResult<PublishReport> {
    let mut report = PublishReport::default();
    for resource in module.resources()? {
        let cached = module
            .md5_cache()
            .and_then(|cache| cache.lookup(&resource.path, &resource.content_id));
        let md5 = match cached {
            Some(md5) => md5,
            None => {
                let md5 = resource.data.md5()?;
                if let Some(cache) = module.md5_cache() {
                    cache.add(&resource.path, &resource.content_id, md5);
                }
                md5
            }
        };

        let label = module.config().label(&resource.path, md5);
        if distributor.write(&label, &resource.data)? {
            report.changed += 1;
        }
        report.total += 1;
    }
    module.save_caches()?;
    Ok(report)
}

/// A complete session: open, publish and close.
pub fn publish_to(module: &mut dyn Module, targets: Vec<Docroot>) -> CoreResult<(PublishReport, Index)> {
    let mut distributor = Distributor::open(targets, module.name())?;
    let report = publish(module, &mut distributor)?;
    let index = distributor.close()?;
    tracing::info!("module {}: {report}", module.name());
    Ok((report, index))
}
