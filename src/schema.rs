//! Remote schema
//!
//! Static descriptions of the remote object types this client knows how to
//! query. Selections are rendered from these definitions, so a field that is
//! not declared here can never be requested.

/// Shape of a declared field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// A leaf value (string, number, boolean, enum, or list of those).
    Scalar,
    /// A nested object (or list of objects) with its own selection.
    Object(&'static TypeDef),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

#[derive(Debug)]
pub struct TypeDef {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a dotted path names a declared field of this type.
    pub fn has_path(&self, path: &str) -> bool {
        let mut ty = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match ty.field(segment) {
                Some(FieldDef {
                    ty: FieldType::Object(inner),
                    ..
                }) => ty = inner,
                Some(_) => return segments.peek().is_none(),
                None => return false,
            }
        }
        true
    }
}

const fn scalar(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        ty: FieldType::Scalar,
    }
}

const fn object(name: &'static str, ty: &'static TypeDef) -> FieldDef {
    FieldDef {
        name,
        ty: FieldType::Object(ty),
    }
}

pub static REPOSITORY: TypeDef = TypeDef {
    name: "Repository",
    fields: &[scalar("id"), scalar("master"), scalar("name")],
};

pub static VIDEO_METADATA: TypeDef = TypeDef {
    name: "VideoMetadata",
    fields: &[
        scalar("videoId"),
        scalar("frameId"),
        scalar("frameIndex"),
    ],
};

pub static BOUNDING_BOX: TypeDef = TypeDef {
    name: "BoundingBox",
    fields: &[scalar("x"), scalar("y"), scalar("w"), scalar("h")],
};

pub static ANNOTATION: TypeDef = TypeDef {
    name: "Annotation",
    fields: &[
        scalar("id"),
        scalar("labels"),
        scalar("source"),
        object("boundingBox", &BOUNDING_BOX),
    ],
};

pub static COLLECTION: TypeDef = TypeDef {
    name: "Collection",
    fields: &[
        scalar("id"),
        scalar("name"),
        scalar("path"),
        scalar("parentId"),
        scalar("childIds"),
        scalar("description"),
        scalar("createdBy"),
        scalar("recursiveVideoCount"),
        scalar("recursiveImageCount"),
        scalar("recursiveDatasetCount"),
    ],
};

pub static DATASET: TypeDef = TypeDef {
    name: "Dataset",
    fields: &[
        scalar("id"),
        scalar("name"),
        scalar("description"),
        scalar("owner"),
        scalar("tags"),
        scalar("createdAt"),
        scalar("modifiedAt"),
        scalar("frameCount"),
        scalar("videoCount"),
        scalar("gitCommitState"),
        scalar("collections"),
        object("repository", &REPOSITORY),
    ],
};

pub static VIDEO: TypeDef = TypeDef {
    name: "Video",
    fields: &[
        scalar("id"),
        scalar("name"),
        scalar("filename"),
        scalar("description"),
        scalar("owner"),
        scalar("tags"),
        scalar("state"),
        scalar("frameCount"),
        scalar("fileSize"),
        scalar("collections"),
        scalar("url"),
        scalar("createdAt"),
    ],
};

pub static IMAGE: TypeDef = TypeDef {
    name: "Image",
    fields: &[
        scalar("id"),
        scalar("name"),
        scalar("filename"),
        scalar("description"),
        scalar("owner"),
        scalar("tags"),
        scalar("state"),
        scalar("width"),
        scalar("height"),
        scalar("fileSize"),
        scalar("collections"),
        scalar("url"),
    ],
};

pub static FRAME: TypeDef = TypeDef {
    name: "Frame",
    fields: &[
        scalar("id"),
        scalar("videoId"),
        scalar("frameIndex"),
        scalar("width"),
        scalar("height"),
        scalar("contentHash"),
        scalar("url"),
        scalar("isFlagged"),
        scalar("isEmpty"),
        object("annotations", &ANNOTATION),
    ],
};

pub static DATASET_FRAME: TypeDef = TypeDef {
    name: "DatasetFrame",
    fields: &[
        scalar("id"),
        scalar("frameId"),
        scalar("datasetId"),
        scalar("width"),
        scalar("height"),
        scalar("contentHash"),
        scalar("isFlagged"),
        scalar("isEmpty"),
        scalar("qaStatus"),
        object("videoMetadata", &VIDEO_METADATA),
        object("annotations", &ANNOTATION),
    ],
};

pub static PROJECT: TypeDef = TypeDef {
    name: "Project",
    fields: &[
        scalar("id"),
        scalar("name"),
        scalar("rootCollectionId"),
        scalar("description"),
        scalar("createdAt"),
    ],
};

/// What a manager is allowed to do with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub queryable: bool,
    pub searchable: bool,
    pub creatable: bool,
}

/// Everything the query layer needs to know about one remote entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub ty: &'static TypeDef,
    /// Root query returning one object by id.
    pub by_id_query: &'static str,
    /// Root query returning a page of objects for a search string.
    pub search_query: Option<&'static str>,
    /// Root query returning the total number of search matches.
    pub count_query: Option<&'static str>,
    /// Mutation creating a new object from a name.
    pub create_mutation: Option<&'static str>,
    /// Fields selected when the caller names none.
    pub default_fields: &'static [&'static str],
    pub capabilities: Capabilities,
}

impl EntityDescriptor {
    pub fn name(&self) -> &'static str {
        self.ty.name
    }
}

pub static DATASETS: EntityDescriptor = EntityDescriptor {
    ty: &DATASET,
    by_id_query: "dataset",
    search_query: Some("datasets"),
    count_query: Some("countDatasets"),
    create_mutation: Some("createDataset"),
    default_fields: &["id", "name", "owner", "frameCount", "repository.master"],
    capabilities: Capabilities {
        queryable: true,
        searchable: true,
        creatable: true,
    },
};

pub static COLLECTIONS: EntityDescriptor = EntityDescriptor {
    ty: &COLLECTION,
    by_id_query: "collection",
    search_query: Some("collections"),
    count_query: Some("countCollections"),
    create_mutation: Some("createCollection"),
    default_fields: &["id", "name", "path", "parentId"],
    capabilities: Capabilities {
        queryable: true,
        searchable: true,
        creatable: true,
    },
};

pub static VIDEOS: EntityDescriptor = EntityDescriptor {
    ty: &VIDEO,
    by_id_query: "video",
    search_query: Some("videos"),
    count_query: Some("countVideos"),
    create_mutation: None,
    default_fields: &["id", "name", "filename", "state", "frameCount"],
    capabilities: Capabilities {
        queryable: true,
        searchable: true,
        creatable: false,
    },
};

pub static IMAGES: EntityDescriptor = EntityDescriptor {
    ty: &IMAGE,
    by_id_query: "image",
    search_query: Some("images"),
    count_query: Some("countImages"),
    create_mutation: None,
    default_fields: &["id", "name", "filename", "state"],
    capabilities: Capabilities {
        queryable: true,
        searchable: true,
        creatable: false,
    },
};

pub static FRAMES: EntityDescriptor = EntityDescriptor {
    ty: &FRAME,
    by_id_query: "frame",
    search_query: None,
    count_query: None,
    create_mutation: None,
    default_fields: &["id", "videoId", "frameIndex", "contentHash"],
    capabilities: Capabilities {
        queryable: true,
        searchable: false,
        creatable: false,
    },
};

pub static DATASET_FRAMES: EntityDescriptor = EntityDescriptor {
    ty: &DATASET_FRAME,
    by_id_query: "datasetFrame",
    search_query: Some("datasetFrames"),
    count_query: Some("countDatasetFrames"),
    create_mutation: None,
    default_fields: &["id", "frameId", "contentHash", "videoMetadata.frameIndex"],
    capabilities: Capabilities {
        queryable: true,
        searchable: true,
        creatable: false,
    },
};

pub static PROJECTS: EntityDescriptor = EntityDescriptor {
    ty: &PROJECT,
    by_id_query: "project",
    search_query: Some("projects"),
    count_query: Some("countProjects"),
    create_mutation: Some("createProject"),
    default_fields: &["id", "name", "rootCollectionId"],
    capabilities: Capabilities {
        queryable: true,
        searchable: true,
        creatable: true,
    },
};

/// All descriptors, for name lookups from the CLI.
pub static ENTITIES: &[&EntityDescriptor] = &[
    &COLLECTIONS,
    &DATASETS,
    &VIDEOS,
    &IMAGES,
    &FRAMES,
    &DATASET_FRAMES,
    &PROJECTS,
];

/// Looks up a descriptor by type name or plural root query, case-insensitively.
pub fn entity_by_name(name: &str) -> Option<&'static EntityDescriptor> {
    let wanted = name.to_ascii_lowercase();
    ENTITIES.iter().copied().find(|e| {
        e.ty.name.to_ascii_lowercase() == wanted
            || e.search_query.map(|q| q.to_ascii_lowercase()) == Some(wanted.clone())
    })
}
