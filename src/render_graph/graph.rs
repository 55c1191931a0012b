//! Render graph definition and compilation

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::backend::*;
use crate::render_graph::error::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Collects pass declarations before they are compiled into a [`RenderGraph`]
#[derive(Debug, Default)]
pub struct RenderGraphBuilder {
    passes: Vec<PassBuilder>,
    dependencies: Vec<(String, String)>,
}

impl RenderGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: PassBuilder) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Consuming variant of [`Self::add_pass`]
    pub fn with_pass(mut self, pass: PassBuilder) -> Self {
        self.passes.push(pass);
        self
    }

    /// Order `to` after `from` without a data dependency between them
    pub fn add_dependency(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.dependencies.push((from.into(), to.into()));
        self
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Validate the declarations, order the passes and allocate every
    /// created resource.
    ///
    /// Passes that are not ordered by an edge keep their declaration order.
    pub fn compile(self, backend: &mut dyn GraphicsBackend) -> GraphResult<RenderGraph> {
        self.compile_inner(backend).map_err(|err| {
            log::error!("Render graph compilation failed: {}", err);
            err
        })
    }

    fn compile_inner(self, backend: &mut dyn GraphicsBackend) -> GraphResult<RenderGraph> {
        let RenderGraphBuilder {
            mut passes,
            dependencies,
        } = self;

        if passes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let edges = collect_edges(&passes, &dependencies)?;
        let order = topological_order(passes.len(), &edges).map_err(|remaining| {
            GraphError::CyclicDependency(
                remaining.iter().map(|&i| passes[i].name.clone()).collect(),
            )
        })?;
        check_writer_order(&passes, &edges)?;

        log::info!(
            "Pass order: {:?}",
            order.iter().map(|&i| passes[i].name.as_str()).collect::<Vec<_>>()
        );

        let mut resources = ResourceTable::new();
        if let Err(err) = allocate_resources(backend, &mut passes, &order, &mut resources) {
            resources.destroy(backend);
            return Err(err);
        }

        let mut slots: Vec<Option<PassBuilder>> = passes.into_iter().map(Some).collect();
        let mut compiled = Vec::with_capacity(order.len());
        for &index in &order {
            let Some(pass) = slots[index].take() else {
                continue;
            };
            match compile_pass(pass, &resources) {
                Ok(pass) => compiled.push(pass),
                Err(err) => {
                    resources.destroy(backend);
                    return Err(err);
                }
            }
        }

        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &i)| (i, pos)).collect();
        let edges = edges
            .iter()
            .map(|&(from, to)| (position[&from], position[&to]))
            .collect();

        log::info!(
            "Compiled render graph: {} passes, {} resources",
            compiled.len(),
            resources.len()
        );

        Ok(RenderGraph {
            passes: compiled,
            edges,
            resources,
        })
    }
}

/// Map each produced name to the index of the pass producing it
fn collect_producers(passes: &[PassBuilder]) -> GraphResult<HashMap<ResourceName, usize>> {
    let mut producers: HashMap<ResourceName, usize> = HashMap::new();
    for (index, pass) in passes.iter().enumerate() {
        for name in pass.produced_names() {
            if let Some(&first) = producers.get(&name) {
                return Err(GraphError::DuplicateResource {
                    resource: name,
                    first: passes[first].name.clone(),
                    second: pass.name.clone(),
                });
            }
            producers.insert(name, index);
        }
    }
    Ok(producers)
}

/// Build the dependency edges between pass indices.
///
/// The producer of a name precedes everything that reads or writes it, and
/// a pass writing a name precedes the passes that only read it.
fn collect_edges(
    passes: &[PassBuilder],
    dependencies: &[(String, String)],
) -> GraphResult<BTreeSet<(usize, usize)>> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (index, pass) in passes.iter().enumerate() {
        if by_name.insert(pass.name.as_str(), index).is_some() {
            return Err(GraphError::DuplicatePass(pass.name.clone()));
        }
    }

    let producers = collect_producers(passes)?;
    let mut readers: HashMap<ResourceName, Vec<usize>> = HashMap::new();
    let mut writers: HashMap<ResourceName, Vec<usize>> = HashMap::new();

    for (index, pass) in passes.iter().enumerate() {
        let used = pass
            .reads
            .iter()
            .map(|(_, name)| *name)
            .chain(pass.writes.iter().map(|(_, name)| *name));
        for name in used {
            if !producers.contains_key(&name) {
                return Err(GraphError::MissingProducer {
                    resource: name,
                    pass: pass.name.clone(),
                });
            }
        }

        for (_, name) in &pass.reads {
            let list = readers.entry(*name).or_default();
            if !list.contains(&index) {
                list.push(index);
            }
        }
        for (_, name) in &pass.writes {
            let list = writers.entry(*name).or_default();
            if !list.contains(&index) {
                list.push(index);
            }
        }
    }

    let mut edges = BTreeSet::new();
    for (name, &producer) in &producers {
        let name_writers = writers.get(name).map(Vec::as_slice).unwrap_or_default();
        let name_readers = readers.get(name).map(Vec::as_slice).unwrap_or_default();

        for &user in name_writers.iter().chain(name_readers) {
            if user != producer {
                edges.insert((producer, user));
            }
        }

        for &writer in name_writers.iter().filter(|&&w| w != producer) {
            for &reader in name_readers {
                if reader != writer && !name_writers.contains(&reader) {
                    edges.insert((writer, reader));
                }
            }
        }
    }

    let lookup = |name: &str| {
        by_name
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownPass(name.to_string()))
    };
    for (index, pass) in passes.iter().enumerate() {
        for dependency in &pass.dependencies {
            edges.insert((lookup(dependency)?, index));
        }
    }
    for (from, to) in dependencies {
        edges.insert((lookup(from)?, lookup(to)?));
    }

    for &(from, to) in &edges {
        log::debug!("Edge {} -> {}", passes[from].name, passes[to].name);
    }

    Ok(edges)
}

/// Kahn's algorithm, always taking the earliest declared ready pass.
/// On a cycle returns the passes that could not be ordered.
fn topological_order(
    count: usize,
    edges: &BTreeSet<(usize, usize)>,
) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree = vec![0usize; count];
    let mut successors = vec![Vec::new(); count];
    for &(from, to) in edges {
        in_degree[to] += 1;
        successors[from].push(to);
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(count);

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() == count {
        Ok(order)
    } else {
        Err((0..count).filter(|&i| in_degree[i] > 0).collect())
    }
}

/// Every pair of non-producing writers of a name must be ordered by a path
fn check_writer_order(passes: &[PassBuilder], edges: &BTreeSet<(usize, usize)>) -> GraphResult<()> {
    let producers = collect_producers(passes)?;
    let mut writers: HashMap<ResourceName, Vec<usize>> = HashMap::new();
    for (index, pass) in passes.iter().enumerate() {
        for (_, name) in &pass.writes {
            if producers.get(name) == Some(&index) {
                continue;
            }
            let list = writers.entry(*name).or_default();
            if !list.contains(&index) {
                list.push(index);
            }
        }
    }

    let mut successors = vec![Vec::new(); passes.len()];
    for &(from, to) in edges {
        successors[from].push(to);
    }
    let reaches = |from: usize, to: usize| {
        let mut visited = vec![false; passes.len()];
        let mut stack = vec![from];
        while let Some(index) = stack.pop() {
            if index == to {
                return true;
            }
            if !std::mem::replace(&mut visited[index], true) {
                stack.extend(successors[index].iter().copied());
            }
        }
        false
    };

    let mut names: Vec<_> = writers.keys().copied().collect();
    names.sort();
    for name in names {
        let list = &writers[&name];
        for (i, &first) in list.iter().enumerate() {
            for &second in &list[i + 1..] {
                if !reaches(first, second) && !reaches(second, first) {
                    return Err(GraphError::UnorderedWriters {
                        resource: name,
                        first: passes[first].name.clone(),
                        second: passes[second].name.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

fn allocate_resources(
    backend: &mut dyn GraphicsBackend,
    passes: &mut [PassBuilder],
    order: &[usize],
    resources: &mut ResourceTable,
) -> GraphResult<()> {
    for &index in order {
        let pass = &mut passes[index];
        for (name, info) in &pass.creates {
            resources
                .create_texture(backend, Some(*name), info.desc.clone(), &info.sampler)
                .map_err(|source| GraphError::ResourceCreation {
                    resource: *name,
                    source,
                })?;
            if info.deferred {
                resources.defer(*name);
            }
        }
        for (name, supplier) in pass.imports.drain(..) {
            resources.import(name, supplier);
        }
    }
    Ok(())
}

fn compile_pass(pass: PassBuilder, resources: &ResourceTable) -> GraphResult<RenderPass> {
    let attachment = |name: ResourceName| {
        resources.find_texture(name).ok_or_else(|| GraphError::UnresolvedAttachment {
            resource: name,
            pass: pass.name.clone(),
        })
    };

    let read_transitions: Vec<ResourceTransition> = pass
        .reads
        .iter()
        .map(|&(access, name)| ResourceTransition {
            name,
            slot: name.slot(),
            kind: match access {
                ReadAccess::Srv => TransitionKind::ShaderResource,
                ReadAccess::Uav => TransitionKind::UnorderedAccess,
            },
        })
        .collect();
    let uav_transition = |name: ResourceName| ResourceTransition {
        name,
        slot: name.slot(),
        kind: TransitionKind::UnorderedAccess,
    };

    let mut draw_passes = Vec::new();
    if pass.draw_passes.is_empty() {
        let mut decl = DrawPassDecl::default();
        let mut transitions = read_transitions.clone();
        for &(access, name) in &pass.writes {
            match access {
                WriteAccess::Rtv => decl.colors.push(name),
                WriteAccess::Dsv if decl.depth.is_some() => {
                    return Err(GraphError::MultipleDepthAttachments { pass: pass.name.clone() });
                }
                WriteAccess::Dsv => decl.depth = Some(name),
                WriteAccess::Uav => transitions.push(uav_transition(name)),
            }
        }

        let colors = decl
            .colors
            .iter()
            .map(|&name| attachment(name))
            .collect::<GraphResult<Vec<_>>>()?;
        let depth = decl.depth.map(&attachment).transpose()?;
        draw_passes.push(DrawPass::new(&decl, colors, depth, transitions));
    } else {
        for decl in &pass.draw_passes {
            let mut transitions = read_transitions.clone();
            transitions.extend(decl.uavs.iter().map(|&name| uav_transition(name)));

            let colors = decl
                .colors
                .iter()
                .map(|&name| attachment(name))
                .collect::<GraphResult<Vec<_>>>()?;
            let depth = decl.depth.map(&attachment).transpose()?;
            draw_passes.push(DrawPass::new(decl, colors, depth, transitions));
        }
    }

    Ok(RenderPass {
        name: pass.name,
        draw_passes,
        execute: pass.execute,
    })
}

/// A compiled render graph: ordered passes and the textures they share
#[derive(Debug)]
pub struct RenderGraph {
    pub(crate) passes: Vec<RenderPass>,
    /// Dependency edges as positions in execution order
    edges: Vec<(usize, usize)>,
    pub(crate) resources: ResourceTable,
}

impl RenderGraph {
    /// Passes in execution order
    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    pub fn pass_order(&self) -> Vec<&str> {
        self.passes.iter().map(RenderPass::name).collect()
    }

    pub fn find_pass(&self, name: &str) -> Option<&RenderPass> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    /// Dependency edges between pass names
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.edges
            .iter()
            .map(|&(from, to)| (self.passes[from].name(), self.passes[to].name()))
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceTable {
        &mut self.resources
    }

    /// Release every texture the graph created
    pub fn destroy(mut self, backend: &mut dyn GraphicsBackend) {
        self.resources.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> GpuTextureDesc {
        GpuTextureDesc::attachment(
            AttachmentType::Color2D,
            PixelFormat::R16G16B16A16_FLOAT,
            32,
            32,
            1,
        )
    }

    fn depth() -> GpuTextureDesc {
        GpuTextureDesc::attachment(
            AttachmentType::DepthStencil2D,
            PixelFormat::R32G8X24_TYPELESS,
            32,
            32,
            1,
        )
    }

    fn compile(builder: RenderGraphBuilder) -> GraphResult<RenderGraph> {
        builder.compile(&mut RecordingBackend::new())
    }

    #[test]
    fn test_empty_graph_fails() {
        assert_eq!(compile(RenderGraphBuilder::new()).unwrap_err(), GraphError::EmptyGraph);
    }

    #[test]
    fn test_consumer_runs_after_producer() {
        let builder = RenderGraphBuilder::new()
            .with_pass(
                PassBuilder::new("p:lighting")
                    .read(ReadAccess::Srv, ResourceName::Gbuffer0)
                    .create(ResourceName::Lighting, color())
                    .write(WriteAccess::Rtv, ResourceName::Lighting),
            )
            .with_pass(
                PassBuilder::new("p:gbuffer")
                    .create(ResourceName::Gbuffer0, color())
                    .write(WriteAccess::Rtv, ResourceName::Gbuffer0),
            );

        let graph = compile(builder).unwrap();
        assert_eq!(graph.pass_order(), vec!["p:gbuffer", "p:lighting"]);
        assert_eq!(
            graph.dependencies().collect::<Vec<_>>(),
            vec![("p:gbuffer", "p:lighting")]
        );
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        let builder = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:b"))
            .with_pass(PassBuilder::new("p:a"))
            .with_pass(PassBuilder::new("p:c"));
        assert_eq!(compile(builder).unwrap().pass_order(), vec!["p:b", "p:a", "p:c"]);
    }

    #[test]
    fn test_missing_producer() {
        let builder = RenderGraphBuilder::new()
            .with_pass(
                PassBuilder::new("p:lighting").read(ReadAccess::Srv, ResourceName::Gbuffer0),
            );
        assert_eq!(
            compile(builder).unwrap_err(),
            GraphError::MissingProducer {
                resource: ResourceName::Gbuffer0,
                pass: "p:lighting".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_pass_and_resource() {
        let builder = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:a"))
            .with_pass(PassBuilder::new("p:a"));
        assert_eq!(compile(builder).unwrap_err(), GraphError::DuplicatePass("p:a".to_string()));

        let builder = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:a").create(ResourceName::Depth, depth()))
            .with_pass(PassBuilder::new("p:b").create(ResourceName::Depth, depth()));
        assert!(matches!(
            compile(builder).unwrap_err(),
            GraphError::DuplicateResource {
                resource: ResourceName::Depth,
                ..
            }
        ));
    }

    #[test]
    fn test_cycle_is_reported() {
        let builder = RenderGraphBuilder::new()
            .with_pass(
                PassBuilder::new("p:a")
                    .create(ResourceName::Gbuffer0, color())
                    .read(ReadAccess::Srv, ResourceName::Gbuffer1),
            )
            .with_pass(
                PassBuilder::new("p:b")
                    .create(ResourceName::Gbuffer1, color())
                    .read(ReadAccess::Srv, ResourceName::Gbuffer0),
            )
            .with_pass(PassBuilder::new("p:c"));

        assert_eq!(
            compile(builder).unwrap_err(),
            GraphError::CyclicDependency(vec!["p:a".to_string(), "p:b".to_string()])
        );
    }

    #[test]
    fn test_explicit_dependency_to_unknown_pass() {
        let mut builder = RenderGraphBuilder::new().with_pass(PassBuilder::new("p:a"));
        builder.add_dependency("p:missing", "p:a");
        assert_eq!(
            compile(builder).unwrap_err(),
            GraphError::UnknownPass("p:missing".to_string())
        );
    }

    #[test]
    fn test_unordered_writers_are_rejected() {
        let builder = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:create").create(ResourceName::Lighting, color()))
            .with_pass(PassBuilder::new("p:first").write(WriteAccess::Rtv, ResourceName::Lighting))
            .with_pass(
                PassBuilder::new("p:second").write(WriteAccess::Rtv, ResourceName::Lighting),
            );
        assert!(matches!(
            compile(builder).unwrap_err(),
            GraphError::UnorderedWriters {
                resource: ResourceName::Lighting,
                ..
            }
        ));

        let mut builder = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:create").create(ResourceName::Lighting, color()))
            .with_pass(
                PassBuilder::new("p:second").write(WriteAccess::Rtv, ResourceName::Lighting),
            )
            .with_pass(PassBuilder::new("p:first").write(WriteAccess::Rtv, ResourceName::Lighting));
        builder.add_dependency("p:first", "p:second");
        assert_eq!(
            compile(builder).unwrap().pass_order(),
            vec!["p:create", "p:first", "p:second"]
        );
    }

    #[test]
    fn test_readers_follow_every_writer() {
        let builder = RenderGraphBuilder::new()
            .with_pass(
                PassBuilder::new("p:present").read(ReadAccess::Srv, ResourceName::PostProcess),
            )
            .with_pass(
                PassBuilder::new("p:overlay").write(WriteAccess::Rtv, ResourceName::PostProcess),
            )
            .with_pass(
                PassBuilder::new("p:post")
                    .create(ResourceName::PostProcess, color())
                    .write(WriteAccess::Rtv, ResourceName::PostProcess),
            );

        assert_eq!(
            compile(builder).unwrap().pass_order(),
            vec!["p:post", "p:overlay", "p:present"]
        );
    }

    #[test]
    fn test_creation_failure_releases_created_textures() {
        let mut backend = RecordingBackend::new();
        backend.fail_creation_of("r:lighting");
        let builder = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:gbuffer").create(ResourceName::Gbuffer0, color()))
            .with_pass(
                PassBuilder::new("p:lighting")
                    .read(ReadAccess::Srv, ResourceName::Gbuffer0)
                    .create(ResourceName::Lighting, color()),
            );

        let err = builder.compile(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            GraphError::ResourceCreation {
                resource: ResourceName::Lighting,
                source: BackendError::TextureCreationFailed(_)
            }
        ));
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_implicit_draw_pass_collects_attachments() {
        let builder = RenderGraphBuilder::new().with_pass(
            PassBuilder::new("p:gbuffer")
                .create(ResourceName::Depth, depth())
                .create(ResourceName::Gbuffer0, color())
                .create(ResourceName::Gbuffer1, color())
                .write(WriteAccess::Dsv, ResourceName::Depth)
                .write(WriteAccess::Rtv, ResourceName::Gbuffer0)
                .write(WriteAccess::Rtv, ResourceName::Gbuffer1),
        );

        let graph = compile(builder).unwrap();
        let draw_pass = &graph.passes()[0].draw_passes()[0];
        assert_eq!(draw_pass.color_attachments.len(), 2);
        assert!(draw_pass.depth_attachment.is_some());
        assert_eq!(draw_pass.out_srvs().len(), 3);
        assert_eq!(draw_pass.buffer_size(), (32, 32));
    }

    #[test]
    fn test_two_depth_writes_fail() {
        let builder = RenderGraphBuilder::new().with_pass(
            PassBuilder::new("p:shadow")
                .create(ResourceName::Depth, depth())
                .create(ResourceName::ShadowMap, depth())
                .write(WriteAccess::Dsv, ResourceName::Depth)
                .write(WriteAccess::Dsv, ResourceName::ShadowMap),
        );
        assert_eq!(
            compile(builder).unwrap_err(),
            GraphError::MultipleDepthAttachments {
                pass: "p:shadow".to_string()
            }
        );
    }

    #[test]
    fn test_unresolved_import_attachment_fails() {
        let builder = RenderGraphBuilder::new().with_pass(
            PassBuilder::new("p:ibl")
                .import(ResourceName::Ibl, |_| None)
                .write(WriteAccess::Rtv, ResourceName::Ibl),
        );
        assert_eq!(
            compile(builder).unwrap_err(),
            GraphError::UnresolvedAttachment {
                resource: ResourceName::Ibl,
                pass: "p:ibl".to_string()
            }
        );
    }
}
